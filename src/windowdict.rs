//! C1: an ordered map keyed by integer revisions, optimized for lookups near
//! a recent cursor (spec §4.1).
//!
//! The representation is two ascending-sorted vectors, `past` (revisions
//! `<= cursor`) and `future` (revisions `> cursor`). A `seek` rebalances by
//! moving entries across the boundary until it matches the requested
//! revision. Successive lookups near each other are amortized O(1); a large
//! jump costs O(n) once, after which nearby lookups are cheap again.

use std::fmt;

/// Values stored in a [`WindowDict`] can represent "never set" vs.
/// "explicitly deleted". `Option<V>` is the canonical implementation: `None`
/// is null.
pub trait MaybeNull {
    fn is_null(&self) -> bool;
}

impl<T> MaybeNull for Option<T> {
    fn is_null(&self) -> bool {
        self.is_none()
    }
}

/// Raised by [`WindowDict::get`] and by the futurist [`WindowDict::set_futurist`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryFault {
    /// `r` precedes the earliest recorded revision.
    NoHistory,
    /// The resolved value is null (explicit deletion).
    Deleted,
}

impl fmt::Display for HistoryFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HistoryFault::NoHistory => write!(f, "no history recorded at or before revision"),
            HistoryFault::Deleted => write!(f, "value was explicitly deleted"),
        }
    }
}

impl std::error::Error for HistoryFault {}

/// A revision-keyed ordered map optimized for lookups near a recent cursor.
///
/// Keyed by `u128` so that [`crate::coord::Rev::pack`]'s packed `(turn,
/// tick)` value fits directly — every caller in this crate uses packed
/// revisions as the key.
#[derive(Debug, Clone)]
pub struct WindowDict<V> {
    /// Ascending by revision; all entries have `revision <= cursor`.
    past: Vec<(u128, V)>,
    /// Ascending by revision; all entries have `revision > cursor`.
    future: Vec<(u128, V)>,
    cursor: u128,
}

impl<V> Default for WindowDict<V> {
    fn default() -> Self {
        WindowDict {
            past: Vec::new(),
            future: Vec::new(),
            cursor: 0,
        }
    }
}

impl<V> WindowDict<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.past.is_empty() && self.future.is_empty()
    }

    pub fn len(&self) -> usize {
        self.past.len() + self.future.len()
    }

    /// Rebalance so that `past` ends at the largest revision `<= r` and
    /// `future` begins at the smallest revision `> r`.
    pub fn seek(&mut self, r: u128) {
        // Pull entries from future into past while they belong there.
        while let Some(&(rev, _)) = self.future.first() {
            if rev <= r {
                let entry = self.future.remove(0);
                self.past.push(entry);
            } else {
                break;
            }
        }
        // Pull entries from past into future while they belong there.
        while let Some(&(rev, _)) = self.past.last() {
            if rev > r {
                let entry = self.past.pop().unwrap();
                self.future.insert(0, entry);
            } else {
                break;
            }
        }
        self.cursor = r;
    }

    /// The largest recorded revision `<= r`, after seeking.
    pub fn rev_before(&mut self, r: u128) -> Option<u128> {
        self.seek(r);
        self.past.last().map(|&(rev, _)| rev)
    }

    /// The smallest recorded revision `> r`, after seeking.
    pub fn rev_after(&mut self, r: u128) -> Option<u128> {
        self.seek(r);
        self.future.first().map(|&(rev, _)| rev)
    }

    /// Insert or overwrite at revision `r`. No duplicate revisions: an
    /// existing entry at `r` is replaced.
    pub fn set(&mut self, r: u128, v: V) {
        self.seek(r);
        if let Some(last) = self.past.last_mut() {
            if last.0 == r {
                last.1 = v;
                return;
            }
        }
        self.past.push((r, v));
    }

    /// Drop all entries with revision `> r`.
    pub fn truncate(&mut self, r: u128) {
        self.seek(r);
        self.future.clear();
    }

    /// Remove the entry at exactly `r`, if any. Does not otherwise disturb
    /// ordering.
    pub fn remove(&mut self, r: u128) -> Option<V> {
        self.seek(r);
        if let Some(last) = self.past.last() {
            if last.0 == r {
                return Some(self.past.pop().unwrap().1);
            }
        }
        None
    }

    /// Iterate revisions and values in `past`, most recent last.
    pub fn past_view(&self) -> impl DoubleEndedIterator<Item = &(u128, V)> {
        self.past.iter()
    }

    /// Iterate revisions and values in `future`, soonest first.
    pub fn future_view(&self) -> impl DoubleEndedIterator<Item = &(u128, V)> {
        self.future.iter()
    }

    /// All entries, ascending.
    pub fn iter(&self) -> impl Iterator<Item = &(u128, V)> {
        self.past.iter().chain(self.future.iter())
    }

    /// Ascending (if `lo <= hi`) or descending (if `lo > hi`) iterator over
    /// entries whose revision lies in the inclusive window between `lo` and
    /// `hi`. `step` skips every `step - 1` matched entries (1 = no
    /// skipping). Endpoints of `None` are open.
    pub fn slice(
        &mut self,
        lo: Option<u128>,
        hi: Option<u128>,
        step: usize,
    ) -> Vec<(u128, &V)> {
        let step = step.max(1);
        let ascending = match (lo, hi) {
            (Some(lo), Some(hi)) => lo <= hi,
            _ => true,
        };
        let (low, high) = match (lo, hi) {
            (Some(a), Some(b)) if a > b => (b, a),
            (Some(a), Some(b)) => (a, b),
            (Some(a), None) => (a, u128::MAX),
            (None, Some(b)) => (0, b),
            (None, None) => (0, u128::MAX),
        };
        let mut matched: Vec<(u64, &V)> = self
            .iter()
            .filter(|&&(rev, _)| rev >= low && rev <= high)
            .map(|(rev, v)| (*rev, v))
            .collect();
        if !ascending {
            matched.reverse();
        }
        matched.into_iter().step_by(step).collect()
    }
}

impl<V: Clone + MaybeNull> WindowDict<V> {
    /// The value at the largest revision `<= r`.
    ///
    /// Fails with [`HistoryFault::NoHistory`] if `r` precedes the earliest
    /// recorded revision, or [`HistoryFault::Deleted`] if the resolved
    /// value is null.
    pub fn get(&mut self, r: u128) -> Result<V, HistoryFault> {
        self.seek(r);
        match self.past.last() {
            None => Err(HistoryFault::NoHistory),
            Some((_, v)) if v.is_null() => Err(HistoryFault::Deleted),
            Some((_, v)) => Ok(v.clone()),
        }
    }

    /// Like [`get`](Self::get), but does not distinguish "never set" from
    /// "deleted": both become `None`. Useful for keycache-style "is this key
    /// live" checks.
    pub fn get_lenient(&mut self, r: u128) -> Option<V> {
        self.get(r).ok()
    }
}

impl<V> WindowDict<V> {
    /// The futurist variant of [`set`](Self::set): rejects writes whose `r`
    /// is not strictly after the latest recorded revision.
    pub fn set_futurist(&mut self, r: u128, v: V) -> Result<(), HistoryFault> {
        let latest = self.past.last().map(|&(rev, _)| rev).max(
            // Note: future is conceptually "ahead of cursor", but a
            // futurist writer should not skip over entries already
            // recorded further in the future either.
            self.future.last().map(|&(rev, _)| rev),
        );
        if let Some(latest) = latest {
            if r <= latest {
                return Err(HistoryFault::NoHistory);
            }
        }
        self.set(r, v);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_before_any_history_faults() {
        let mut wd: WindowDict<Option<i32>> = WindowDict::new();
        wd.set(5, Some(1));
        assert_eq!(wd.get(4), Err(HistoryFault::NoHistory));
        assert_eq!(wd.get(5), Ok(Some(1)));
    }

    #[test]
    fn get_of_deleted_value_faults() {
        let mut wd: WindowDict<Option<i32>> = WindowDict::new();
        wd.set(1, Some(10));
        wd.set(2, None);
        assert_eq!(wd.get(2), Err(HistoryFault::Deleted));
        assert_eq!(wd.get(1), Ok(Some(10)));
    }

    #[test]
    fn overwrite_same_revision_replaces() {
        let mut wd: WindowDict<Option<i32>> = WindowDict::new();
        wd.set(3, Some(1));
        wd.set(3, Some(2));
        assert_eq!(wd.len(), 1);
        assert_eq!(wd.get(3), Ok(Some(2)));
    }

    #[test]
    fn seek_rebalances_past_future() {
        let mut wd: WindowDict<Option<i32>> = WindowDict::new();
        for r in [0u128, 5, 10, 15] {
            wd.set(r, Some(r as i32));
        }
        wd.seek(7);
        assert_eq!(wd.rev_before(7), Some(5));
        assert_eq!(wd.rev_after(7), Some(10));
        wd.seek(20);
        assert_eq!(wd.rev_before(20), Some(15));
        assert_eq!(wd.rev_after(20), None);
        wd.seek(0);
        assert_eq!(wd.rev_before(0), Some(0));
    }

    #[test]
    fn truncate_drops_future_entries() {
        let mut wd: WindowDict<Option<i32>> = WindowDict::new();
        for r in [0u128, 1, 2, 3] {
            wd.set(r, Some(r as i32));
        }
        wd.truncate(1);
        assert_eq!(wd.get(3), Err(HistoryFault::NoHistory));
        assert_eq!(wd.get(1), Ok(Some(1)));
    }

    #[test]
    fn futurist_rejects_non_increasing_writes() {
        let mut wd: WindowDict<Option<i32>> = WindowDict::new();
        wd.set_futurist(5, Some(1)).unwrap();
        assert!(wd.set_futurist(5, Some(2)).is_err());
        assert!(wd.set_futurist(4, Some(2)).is_err());
        assert!(wd.set_futurist(6, Some(2)).is_ok());
    }

    #[test]
    fn slice_ascending_and_descending() {
        let mut wd: WindowDict<Option<i32>> = WindowDict::new();
        for r in [0u128, 2, 4, 6, 8] {
            wd.set(r, Some(r as i32));
        }
        let asc: Vec<u128> = wd.slice(Some(2), Some(6), 1).into_iter().map(|(r, _)| r).collect();
        assert_eq!(asc, vec![2, 4, 6]);
        let desc: Vec<u128> = wd.slice(Some(6), Some(2), 1).into_iter().map(|(r, _)| r).collect();
        assert_eq!(desc, vec![6, 4, 2]);
    }

    #[test]
    fn remove_locates_exact_revision() {
        let mut wd: WindowDict<Option<i32>> = WindowDict::new();
        wd.set(1, Some(1));
        wd.set(2, Some(2));
        assert_eq!(wd.remove(1), Some(Some(1)));
        assert_eq!(wd.get(2), Ok(Some(2)));
        assert_eq!(wd.get(1), Err(HistoryFault::NoHistory));
    }
}

#[cfg(all(test, feature = "proptest"))]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn seek_is_idempotent(revs in prop::collection::vec(0u128..200, 0..30), query in 0u128..200) {
            let mut wd: WindowDict<Option<i32>> = WindowDict::new();
            for (i, r) in revs.iter().enumerate() {
                wd.set(*r, Some(i as i32));
            }
            wd.seek(query);
            let before1 = wd.rev_before(query);
            wd.seek(query);
            let before2 = wd.rev_before(query);
            prop_assert_eq!(before1, before2);
        }

        #[test]
        fn get_matches_linear_scan(revs in prop::collection::vec(0u128..200, 1..30), query in 0u128..200) {
            let mut wd: WindowDict<Option<i32>> = WindowDict::new();
            let mut model: Vec<(u128, i32)> = Vec::new();
            for (i, r) in revs.iter().enumerate() {
                wd.set(*r, Some(i as i32));
                model.retain(|&(rev, _)| rev != *r);
                model.push((*r, i as i32));
            }
            model.sort_by_key(|&(r, _)| r);
            let expected = model.iter().rev().find(|&&(r, _)| r <= query).map(|&(_, v)| v);
            let actual = wd.get(query).ok().flatten();
            prop_assert_eq!(actual, expected);
        }
    }
}

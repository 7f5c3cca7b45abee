//! Shared helpers for the integration tests in this directory.

use chronograph::engine::Engine;
use chronograph::gateway::memory::MemoryGateway;
use chronograph::EngineConfig;

#[allow(dead_code)]
pub fn fresh_engine() -> Engine<MemoryGateway> {
    Engine::new(MemoryGateway::new(), EngineConfig::default()).unwrap()
}

#[allow(dead_code)]
pub fn engine_with_capacity(keycache_capacity: usize) -> Engine<MemoryGateway> {
    let config = EngineConfig {
        keycache_capacity,
        ..EngineConfig::default()
    };
    Engine::new(MemoryGateway::new(), config).unwrap()
}

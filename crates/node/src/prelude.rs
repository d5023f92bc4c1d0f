//! Re-exports needed to bootstrap a node.
pub use ringkv_core;

pub use self::ringkv_core::dht::Did;
pub use self::ringkv_core::dht::Peer;
pub use self::ringkv_core::dht::Stabilizer;
pub use self::ringkv_core::storage::MemStorage;
pub use self::ringkv_core::swarm::Swarm;
pub use self::ringkv_core::swarm::SwarmBuilder;
pub use self::ringkv_core::swarm::SwarmConfig;

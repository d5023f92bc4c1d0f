#![warn(missing_docs)]
//! This module provider [SwarmBuilder] and it's interface for
//! [Swarm]

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::dht::Peer;
use crate::dht::PeerRing;
use crate::error::Result;
use crate::storage::MemStorage;
use crate::storage::NodeStorage;
use crate::swarm::RingTransport;
use crate::swarm::Swarm;
use crate::swarm::SwarmConfig;

/// Creates a SwarmBuilder to configure a Swarm.
pub struct SwarmBuilder {
    config: SwarmConfig,
    transport: Arc<dyn RingTransport>,
}

impl SwarmBuilder {
    /// Creates new instance of [SwarmBuilder]
    pub fn new(config: SwarmConfig, transport: Arc<dyn RingTransport>) -> Self {
        SwarmBuilder { config, transport }
    }

    /// Try build for `Swarm`.
    pub fn build(self) -> Result<Swarm> {
        self.config.validate()?;

        let peer = Peer::from_addr(self.config.advertise.clone());
        let dht = Arc::new(PeerRing::new(peer, self.config.successor_list_size));
        let storage: NodeStorage = Box::new(MemStorage::<Vec<u8>>::new());

        Ok(Swarm {
            dht,
            storage,
            migration: RwLock::new(()),
            transport: self.transport,
            config: self.config,
        })
    }
}

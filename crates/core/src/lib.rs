//! ringkv: a Chord distributed hash table with ownership-migrating storage.
//! --------------
//! - [Chord](crate::dht::PeerRing) keeps the ring state of one node: successor list,
//!   predecessor, finger table and status.
//! - [Stabilizer](crate::dht::Stabilizer) drives the periodic protocols that heal the ring
//!   after joins, graceful departures and crashes.
//! - [Swarm](crate::swarm::Swarm) is the node as a whole. It owns the ring state, the local
//!   partition of the key-value store and a [RingTransport](crate::swarm::RingTransport)
//!   used to talk to other nodes.
//!
//! # Joining a ring
//!
//! 1. A fresh node is a singleton ring: its successor is itself and it has no predecessor.
//! 2. Given a contact `nprime`, the node asks `nprime` to look up the successor of its own Did
//!   and adopts the answer as successor.
//! 3. The node notifies its successor. The successor adopts it as predecessor and hands over
//!   every key that now falls into `(predecessor, joiner]`.
//! 4. Periodic stabilization fixes the remaining pointers and the finger table.
//!
//! # Failures
//!
//! A node may be crashed (simulated) and recovered. A crashed node keeps its state but refuses
//! every request, so other nodes see it exactly like an unreachable peer: they drop it from
//! their finger tables and successor lists and fail over to the next live successor.

pub mod consts;
pub mod dht;
pub mod error;
pub mod storage;
pub mod swarm;

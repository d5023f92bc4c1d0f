//! HTTP node of ringkv.
//!
//! A [Swarm](ringkv_core::swarm::Swarm) is served by an axum [endpoint], reaches other nodes
//! through the reqwest based [transport], and is configured from a YAML [config] file plus
//! command line flags of the `ringkv` binary.
pub mod config;
pub mod endpoint;
pub mod error;
pub mod logging;
pub mod prelude;
pub mod transport;
pub mod util;

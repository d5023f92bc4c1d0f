//! Liveness state machine of a node.
//!
//! ```text
//!   Active --crash--> Crashed --recover--> Active
//!     |                  |
//!     +------leave-------+-----> Left (terminal)
//! ```
//!
//! A crashed node keeps its ring state and store but serves nothing except `recover`.
//! A node that left serves nothing except a repeated `leave`.

use serde::Deserialize;
use serde::Serialize;

use crate::error::Error;
use crate::error::Result;

/// Status of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    /// Serving requests and running stabilization.
    #[default]
    Active,
    /// Simulated crash: state kept, every request refused.
    Crashed,
    /// Left gracefully. Terminal.
    Left,
}

impl NodeStatus {
    /// Gate for inbound requests.
    pub fn check_serving(&self, addr: &str) -> Result<()> {
        match self {
            Self::Active => Ok(()),
            Self::Crashed => Err(Error::NodeCrashed(addr.to_string())),
            Self::Left => Err(Error::AlreadyLeft),
        }
    }

    /// `Active -> Crashed`. Crashing twice yields [Error::AlreadyCrashed].
    pub fn crash(&mut self) -> Result<()> {
        match self {
            Self::Active => {
                *self = Self::Crashed;
                Ok(())
            }
            Self::Crashed => Err(Error::AlreadyCrashed),
            Self::Left => Err(Error::AlreadyLeft),
        }
    }

    /// `Crashed -> Active`. Returns false when the node was already active.
    pub fn recover(&mut self) -> Result<bool> {
        match self {
            Self::Crashed => {
                *self = Self::Active;
                Ok(true)
            }
            Self::Active => Ok(false),
            Self::Left => Err(Error::AlreadyLeft),
        }
    }

    /// `Active | Crashed -> Left`.
    pub fn leave(&mut self) -> Result<()> {
        match self {
            Self::Left => Err(Error::AlreadyLeft),
            _ => {
                *self = Self::Left;
                Ok(())
            }
        }
    }

    /// Whether the node serves requests.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

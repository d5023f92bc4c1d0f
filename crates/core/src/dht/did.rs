#![warn(missing_docs)]

//! This module defines the identifier space of the ring.
//!
//! A [Did] is a position on a circle of size 2^160. Node Dids are the SHA-1 digest of the
//! node's advertised address, key Dids are the SHA-1 digest of the key string, so both share
//! one circle and a key belongs to the first node met walking clockwise from it.
//!
//! There is no meaningful linear order on a circle. All ownership and routing decisions use
//! the interval predicates [Did::in_open] and [Did::in_closed_right], or compare distances
//! relative to a chosen origin with [BiasId].

use std::cmp::PartialEq;
use std::ops::Add;
use std::ops::Deref;
use std::ops::Neg;
use std::ops::Sub;
use std::str::FromStr;

use ethereum_types::H160;
use num_bigint::BigUint;
use serde::Deserialize;
use serde::Serialize;
use sha1::Digest;
use sha1::Sha1;

use crate::consts::DID_BITS;
use crate::error::Error;
use crate::error::Result;

/// Did is a finite ring R(P) where P = 2^160, wrap H160.
#[derive(Copy, Clone, Eq, Ord, PartialEq, PartialOrd, Debug, Serialize, Deserialize, Hash)]
pub struct Did(H160);

impl std::fmt::Display for Did {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let inner = &self.0;
        write!(f, "0x{inner:x}")
    }
}

/// Bias Did is a Did observed from another Did taken as the zero point.
/// Two Dids cannot be ordered on a circle, but their clockwise distances from a common
/// origin can. [BiasId] implements [Ord] on that distance.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Serialize, Deserialize, Hash)]
pub struct BiasId {
    /// the zero point for determine order of Did.
    bias: Did,
    /// did data without bias.
    did: Did,
}

impl BiasId {
    /// Wrap a Did into BiasDid with given bias.
    pub fn new(bias: Did, did: Did) -> BiasId {
        BiasId {
            bias,
            did: did - bias,
        }
    }

    /// Get wrapped biased value from did
    pub fn to_did(self) -> Did {
        self.did + self.bias
    }

    /// Clockwise distance from the bias.
    pub fn pos(&self) -> Did {
        self.did
    }
}

impl PartialOrd for BiasId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BiasId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        if other.bias != self.bias {
            let did: Did = other.to_did();
            let bid = BiasId::new(self.bias, did);
            self.did.cmp(&bid.did)
        } else {
            self.did.cmp(&other.did)
        }
    }
}

impl From<BiasId> for Did {
    fn from(id: BiasId) -> Did {
        BiasId::to_did(id)
    }
}

impl From<u32> for Did {
    fn from(id: u32) -> Did {
        Self::from(BigUint::from(id))
    }
}

fn modulus() -> BigUint {
    BigUint::from(2u16).pow(DID_BITS as u32)
}

impl Did {
    /// Map arbitrary bytes onto the ring with SHA-1.
    pub fn hash(bytes: impl AsRef<[u8]>) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(bytes.as_ref());
        let digest = hasher.finalize();
        Self(H160::from_slice(&digest))
    }

    /// Test x <- (a, b).
    /// `(a, a)` is the whole ring except `a`.
    pub fn in_open(&self, a: Self, b: Self) -> bool {
        let x = BiasId::new(a, *self).pos();
        let zero = Did::default();
        if a == b {
            return x != zero;
        }
        x > zero && x < BiasId::new(a, b).pos()
    }

    /// Test x <- (a, b].
    /// `(a, a]` is the whole ring.
    pub fn in_closed_right(&self, a: Self, b: Self) -> bool {
        if a == b {
            return true;
        }
        let x = BiasId::new(a, *self).pos();
        x > Did::default() && x <= BiasId::new(a, b).pos()
    }

    /// Transform Did to BiasDid
    pub fn bias(&self, did: Self) -> BiasId {
        BiasId::new(did, *self)
    }

    /// Start of the `index`-th finger of a node with this Did: `self + 2^index`.
    pub fn finger_start(&self, index: usize) -> Self {
        *self + Did::from(BigUint::from(2u16).pow(index as u32))
    }
}

impl Default for Did {
    fn default() -> Self {
        Self(H160::zero())
    }
}

/// Ordering with a did reference
/// This trait defines necessary method for sorting based on did.
pub trait SortRing {
    /// Sort a impl SortRing with given did
    fn sort(&mut self, did: Did);
}

impl SortRing for Vec<Did> {
    fn sort(&mut self, did: Did) {
        self.sort_by_key(|x| x.bias(did));
    }
}

impl Deref for Did {
    type Target = H160;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Did> for BigUint {
    fn from(did: Did) -> BigUint {
        BigUint::from_bytes_be(did.as_bytes())
    }
}

impl From<BigUint> for Did {
    fn from(a: BigUint) -> Self {
        let ff = a % modulus();
        let mut va: Vec<u8> = ff.to_bytes_be();
        let mut res = vec![0u8; 20 - va.len()];
        res.append(&mut va);
        Self(H160::from_slice(&res))
    }
}

impl From<H160> for Did {
    fn from(addr: H160) -> Self {
        Self(addr)
    }
}

impl FromStr for Did {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        Ok(Self(H160::from_str(s).map_err(|_| Error::BadHexDid)?))
    }
}

// impl Finite Ring For Did
impl Neg for Did {
    type Output = Self;
    fn neg(self) -> Self {
        let ret = modulus() - BigUint::from(self);
        ret.into()
    }
}

impl Add for Did {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        ((BigUint::from(self) + BigUint::from(rhs)) % modulus()).into()
    }
}

impl Sub for Did {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        self + (-rhs)
    }
}

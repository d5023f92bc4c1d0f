//! Constant variables.

/// Bit width of the identifier space. Dids are SHA-1 digests.
pub const DID_BITS: usize = 160;
/// Default length of the successor list.
pub const DEFAULT_SUCCESSOR_LIST_SIZE: u8 = 3;
/// Default hop budget of an iterative lookup.
pub const DEFAULT_MAX_LOOKUP_HOPS: usize = 32;
/// Default wall clock budget of an iterative lookup, in ms.
pub const DEFAULT_LOOKUP_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_STABILIZE_INTERVAL_MS: u64 = 250;
pub const DEFAULT_FIX_FINGERS_INTERVAL_MS: u64 = 100;
pub const DEFAULT_CHECK_PREDECESSOR_INTERVAL_MS: u64 = 500;
/// Attempts of a get or put, each starting with a fresh lookup of the owner.
pub const MAX_STORAGE_ATTEMPTS: usize = 3;
/// Upper bound of nodes visited by a ring traversal.
pub const MAX_RING_WALK: usize = 1024;

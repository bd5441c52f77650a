//! Opaque 32-byte identifiers used throughout the engine.
//!
//! An [`Id`] addresses vertices, transactions and the inputs transactions
//! consume. Equality and ordering are defined over the raw bytes, which is
//! what gives the decision procedure and the scheduler's tie-breaking rule
//! their determinism: two engines fed the same byte sequence derive the
//! same ordering, independent of hash-map iteration order or wall-clock
//! arrival.

use std::convert::TryInto;
use std::fmt;
use std::ops::Index;
use std::str::FromStr;

use base58check::{FromBase58Check, ToBase58Check};
use blake2::digest::{Update, VariableOutput};
use blake2::Blake2bVar;
use rand::{self, Rng};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A 32-byte opaque identifier.
///
/// Displayed using the Base58check format, matching the rest of the
/// ecosystem this engine is grounded on.
#[derive(Hash, Eq, PartialEq, Ord, PartialOrd, Copy, Clone, Serialize, Deserialize, Default)]
pub struct Id([u8; 32]);

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0.to_base58check(0))
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0.to_base58check(0))
    }
}

impl FromStr for Id {
    type Err = Error;

    /// Converts a base58check encoded string back into an `Id`.
    fn from_str(id_str: &str) -> Result<Self, Error> {
        let (vsn, bytes) = id_str.from_base58check().map_err(|_| Error::InvalidIdEncoding)?;
        if vsn != 0 {
            return Err(Error::InvalidIdEncoding);
        }
        let bytes: [u8; 32] = bytes.as_slice().try_into().map_err(|_| Error::InvalidIdEncoding)?;
        Ok(Id(bytes))
    }
}

impl Id {
    /// Derives an `Id` deterministically from a byte payload via a 256-bit hash.
    pub fn new(bytes: &[u8]) -> Id {
        Id(hash(bytes))
    }

    /// Wraps a raw 32-byte digest directly, for callers that already hold
    /// one (e.g. a content hash computed upstream of this crate).
    pub fn from_hash(bytes: [u8; 32]) -> Id {
        Id(bytes)
    }

    /// Generates a random `Id`. Useful for tests and synthetic workloads.
    pub fn generate() -> Id {
        let mut rng = rand::thread_rng();
        let v: [u8; 32] = rng.gen();
        Id(v)
    }

    /// The all-zeroes `Id`, conventionally used as a genesis placeholder.
    pub fn zero() -> Id {
        Id([0u8; 32])
    }

    /// The maximal (all `0xFF`) `Id`, useful as a sentinel in tests.
    pub fn max() -> Id {
        Id([255u8; 32])
    }

    /// Returns the wrapped byte array.
    pub fn bytes(&self) -> [u8; 32] {
        self.0
    }

    /// Returns a slice view over the contained bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Hex-encodes the raw bytes, matching the plain `hex::encode`
    /// rendering the wider pack uses for hashes in log lines (the
    /// `Display`/`Debug` impls above use base58check instead, which is
    /// this crate's own canonical external representation).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

// overloads array indexing (e.g: id[0] = first byte of id), used by the
// worker pool's deterministic dispatch rule (task.id[0] mod worker-count).
impl Index<usize> for Id {
    type Output = u8;

    fn index(&self, i: usize) -> &u8 {
        &self.0[i]
    }
}

fn hash(input: &[u8]) -> [u8; 32] {
    let mut hasher = Blake2bVar::new(32).unwrap();
    hasher.update(input);
    let mut buf = [0u8; 32];
    hasher.finalize_variable(&mut buf).unwrap();
    buf
}

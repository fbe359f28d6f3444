// This file is part of TRINCI.
//
// Copyright (C) 2021 Affidaty Spa.
//
// TRINCI is free software: you can redistribute it and/or modify it under
// the terms of the GNU Affero General Public License as published by the
// Free Software Foundation, either version 3 of the License, or (at your
// option) any later version.
//
// TRINCI is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or
// FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License
// for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with TRINCI. If not, see <https://www.gnu.org/licenses/>.

//! Key-value storage consumed by the engine.
//!
//! The store is organized in buckets. Digest bytes live in a type agnostic
//! bucket while message bodies and message hash lists live in buckets owned
//! by the network type module they belong to. The engine never deletes.

use crate::error::*;
#[cfg(test)]
use mockall::automock;
use std::fmt::{Display, Formatter};

pub mod memory;
pub use memory::MemoryDb;

/// Bucket identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BucketId {
    /// Digest bytes keyed by digest hash.
    BytesByHash,
    /// Message bodies keyed by message hash, one bucket per network type.
    TypedBytesByHash(&'static str),
    /// Concatenated message hashes keyed by their Merkle root, one bucket per
    /// network type.
    ListByMerkleRoot(&'static str),
}

impl Display for BucketId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            BucketId::BytesByHash => write!(f, "bytes_by_hash"),
            BucketId::TypedBytesByHash(uid) => write!(f, "bytes_by_hash:{}", uid),
            BucketId::ListByMerkleRoot(uid) => write!(f, "list_by_merkle_root:{}", uid),
        }
    }
}

/// Trait providing access to the database.
/// Implementations shall be safe for concurrent point reads and writes.
#[cfg_attr(test, automock)]
pub trait Db: Send + Sync {
    /// Load the value stored under `key`, `None` if absent.
    fn get(&self, bucket: BucketId, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Store `value` under `key`.
    fn set(&self, bucket: BucketId, key: &[u8], value: &[u8]) -> Result<()>;
}

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

//! Volatile database implementation.

use crate::{
    base::RwLock,
    db::{BucketId, Db},
    Result,
};
use std::collections::HashMap;

/// In memory database, mostly used by tests and light tooling.
#[derive(Default, Debug)]
pub struct MemoryDb {
    buckets: RwLock<HashMap<BucketId, HashMap<Vec<u8>, Vec<u8>>>>,
}

impl MemoryDb {
    pub fn new() -> Self {
        MemoryDb::default()
    }

    /// Number of entries within `bucket`.
    pub fn len(&self, bucket: BucketId) -> usize {
        self.buckets
            .read()
            .get(&bucket)
            .map(|entries| entries.len())
            .unwrap_or_default()
    }

    /// Total number of entries.
    pub fn total_len(&self) -> usize {
        self.buckets.read().values().map(|entries| entries.len()).sum()
    }
}

impl Db for MemoryDb {
    fn get(&self, bucket: BucketId, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let value = self
            .buckets
            .read()
            .get(&bucket)
            .and_then(|entries| entries.get(key))
            .cloned();
        Ok(value)
    }

    fn set(&self, bucket: BucketId, key: &[u8], value: &[u8]) -> Result<()> {
        self.buckets
            .write()
            .entry(bucket)
            .or_default()
            .insert(key.to_vec(), value.to_vec());
        Ok(())
    }
}

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

//! Merkle resolver.
//!
//! Reconstruction of stored structures known only by their hash. Consumers
//! register data requests together with a requester that is called back
//! once the data is available; the requester can in turn request the data
//! referenced by what it received. The resolver checks every delivered
//! value against its key before writing it into the target store.

use crate::{
    crypto::{HashAlgorithm, HASH_LEN, Hash},
    db::{BucketId, Db},
    ntm, Error, ErrorKind, Result,
};
use std::{collections::VecDeque, sync::Arc};

/// Consumer of requested data.
pub trait DataRequester {
    /// Called when the requested data has been delivered and stored.
    fn on_data(self: Box<Self>, data: &[u8], builder: &mut dyn MerkleBuilder) -> Result<()>;
}

/// Data request sink.
pub trait MerkleBuilder {
    fn request_data(&mut self, bucket: BucketId, key: &[u8], requester: Box<dyn DataRequester>);
}

struct Request {
    bucket: BucketId,
    key: Vec<u8>,
    requester: Box<dyn DataRequester>,
}

/// Checks that `data` is the value addressed by `key` within `bucket`.
pub fn verify_data(bucket: BucketId, key: &[u8], data: &[u8]) -> Result<()> {
    let expected = match bucket {
        BucketId::BytesByHash => Some(HashAlgorithm::Sha3_256.digest(data)),
        BucketId::TypedBytesByHash(uid) => Some(ntm::for_uid(uid)?.hash(data)),
        BucketId::ListByMerkleRoot(uid) => {
            if data.len() % HASH_LEN != 0 {
                return Err(Error::new_ext(
                    ErrorKind::MalformedData,
                    format!("bad hash list length {}", data.len()),
                ));
            }
            let hashes = data
                .chunks_exact(HASH_LEN)
                .map(Hash::from_bytes)
                .collect::<Result<Vec<_>>>()?;
            ntm::for_uid(uid)?.merkle_root(&hashes)
        }
    };
    match expected {
        Some(hash) if hash.as_bytes() == key => Ok(()),
        _ => Err(Error::new_ext(
            ErrorKind::MalformedData,
            format!("data does not match key {} in {}", hex::encode(key), bucket),
        )),
    }
}

/// Resolver writing the resolved data into a target store.
pub struct Builder {
    target: Arc<dyn Db>,
    pending: VecDeque<Request>,
    received: usize,
}

impl Builder {
    pub fn new(target: Arc<dyn Db>) -> Self {
        Builder {
            target,
            pending: VecDeque::new(),
            received: 0,
        }
    }

    /// Number of requests still waiting for data.
    pub fn unresolved_count(&self) -> usize {
        self.pending.len()
    }

    /// Number of values delivered so far.
    pub fn received_count(&self) -> usize {
        self.received
    }

    /// Pending requests, oldest first.
    pub fn requests(&self) -> Vec<(BucketId, Vec<u8>)> {
        self.pending
            .iter()
            .map(|req| (req.bucket, req.key.clone()))
            .collect()
    }

    /// Deliver the data for a pending request.
    /// Returns `false` if nothing was waiting for it.
    pub fn deliver(&mut self, bucket: BucketId, key: &[u8], data: &[u8]) -> Result<bool> {
        let pos = match self
            .pending
            .iter()
            .position(|req| req.bucket == bucket && req.key == key)
        {
            Some(pos) => pos,
            None => return Ok(false),
        };
        verify_data(bucket, key, data)?;
        let request = match self.pending.remove(pos) {
            Some(request) => request,
            None => return Ok(false),
        };
        self.complete(request, data)?;
        Ok(true)
    }

    /// Resolve every pending request, and the ones they trigger, reading from
    /// the target store first and from `source` otherwise.
    pub fn resolve_from(&mut self, source: &dyn Db) -> Result<()> {
        while let Some(request) = self.pending.pop_front() {
            let data = match self.target.get(request.bucket, &request.key)? {
                Some(data) => data,
                None => match source.get(request.bucket, &request.key)? {
                    Some(data) => data,
                    None => {
                        let err = Error::new_ext(
                            ErrorKind::ResourceNotFound,
                            format!("{} in {}", hex::encode(&request.key), request.bucket),
                        );
                        self.pending.push_front(request);
                        return Err(err);
                    }
                },
            };
            if let Err(err) = verify_data(request.bucket, &request.key, &data) {
                self.pending.push_front(request);
                return Err(err);
            }
            self.complete(request, &data)?;
        }
        debug!("merkle resolver done: {} values received", self.received);
        Ok(())
    }

    fn complete(&mut self, request: Request, data: &[u8]) -> Result<()> {
        self.target.set(request.bucket, &request.key, data)?;
        self.received += 1;
        request.requester.on_data(data, self)
    }
}

impl MerkleBuilder for Builder {
    fn request_data(&mut self, bucket: BucketId, key: &[u8], requester: Box<dyn DataRequester>) {
        self.pending.push_back(Request {
            bucket,
            key: key.to_vec(),
            requester,
        });
    }
}

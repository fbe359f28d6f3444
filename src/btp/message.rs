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

//! Messages and message lists.
//!
//! A message list keeps the concatenation of the message hashes and, per
//! index, the message object when already loaded. Message bodies missing
//! from memory are fetched from the type bytes-by-hash bucket on demand.

use crate::{
    base::Mutex,
    crypto::{Hash, MerkleNode, HASH_LEN},
    db::Db,
    ntm::Module,
    Error, ErrorKind, Result,
};
use std::sync::Arc;

/// Opaque message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    hash: Hash,
    bytes: Vec<u8>,
}

impl Message {
    pub fn new(module: &dyn Module, bytes: Vec<u8>) -> Self {
        let hash = module.hash(&bytes);
        Message { hash, bytes }
    }

    pub fn hash(&self) -> &Hash {
        &self.hash
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

pub struct MessageList {
    module: &'static dyn Module,
    hashes: Vec<u8>,
    messages: Mutex<Vec<Option<Arc<Message>>>>,
    root: Mutex<Option<Option<Hash>>>,
    db: Option<Arc<dyn Db>>,
}

impl std::fmt::Debug for MessageList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageList")
            .field("module", &self.module.uid())
            .field("len", &self.len())
            .field("root", &self.root())
            .finish()
    }
}

impl MessageList {
    /// Empty list.
    pub fn new(module: &'static dyn Module) -> Self {
        MessageList {
            module,
            hashes: vec![],
            messages: Mutex::new(vec![]),
            root: Mutex::new(None),
            db: None,
        }
    }

    /// List stored under `root` in the type list-by-merkle-root bucket.
    /// An absent root is an empty list.
    pub fn load(db: Arc<dyn Db>, module: &'static dyn Module, root: Option<&Hash>) -> Result<Self> {
        let root = match root {
            Some(root) => root,
            None => {
                let mut list = MessageList::new(module);
                list.db = Some(db);
                return Ok(list);
            }
        };
        let hashes = db
            .get(module.list_by_merkle_root_bucket(), root.as_bytes())?
            .ok_or_else(|| {
                Error::new_ext(
                    ErrorKind::ResourceNotFound,
                    format!("message list {}", root),
                )
            })?;
        let list = Self::from_hashes(module, hashes, Some(db))?;
        if list.root().as_ref() != Some(root) {
            return Err(Error::new_ext(
                ErrorKind::MalformedData,
                format!("message list does not match root {}", root),
            ));
        }
        Ok(list)
    }

    /// List from the concatenation of the message hashes.
    pub fn from_hashes(module: &'static dyn Module, hashes: Vec<u8>, db: Option<Arc<dyn Db>>) -> Result<Self> {
        if hashes.len() % HASH_LEN != 0 {
            return Err(Error::new_ext(
                ErrorKind::MalformedData,
                format!("bad hash list length {}", hashes.len()),
            ));
        }
        let count = hashes.len() / HASH_LEN;
        Ok(MessageList {
            module,
            hashes,
            messages: Mutex::new(vec![None; count]),
            root: Mutex::new(None),
            db,
        })
    }

    pub fn module(&self) -> &'static dyn Module {
        self.module
    }

    pub fn len(&self) -> usize {
        self.hashes.len() / HASH_LEN
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    /// Concatenated message hashes.
    pub fn hash_list_bytes(&self) -> &[u8] {
        &self.hashes
    }

    pub fn hash_at(&self, index: usize) -> Result<Hash> {
        if index >= self.len() {
            return Err(Error::new_ext(
                ErrorKind::InvalidIndex,
                format!("message {} out of {}", index, self.len()),
            ));
        }
        Hash::from_bytes(&self.hashes[index * HASH_LEN..(index + 1) * HASH_LEN])
    }

    fn hashes(&self) -> Vec<Hash> {
        self.hashes
            .chunks_exact(HASH_LEN)
            .map(|chunk| {
                let mut buf = [0u8; HASH_LEN];
                buf.copy_from_slice(chunk);
                Hash::new(buf)
            })
            .collect()
    }

    /// Merkle root of the message hashes, absent for an empty list.
    pub fn root(&self) -> Option<Hash> {
        let mut cache = self.root.lock();
        *cache.get_or_insert_with(|| self.module.merkle_root(&self.hashes()))
    }

    pub fn append(&mut self, bytes: Vec<u8>) {
        let message = Message::new(self.module, bytes);
        self.hashes.extend_from_slice(message.hash().as_bytes());
        self.messages.get_mut().push(Some(Arc::new(message)));
        *self.root.get_mut() = None;
    }

    pub fn get(&self, index: usize) -> Result<Arc<Message>> {
        let hash = self.hash_at(index)?;
        let mut messages = self.messages.lock();
        if let Some(message) = &messages[index] {
            return Ok(message.clone());
        }
        let bytes = match &self.db {
            Some(db) => db.get(self.module.bytes_by_hash_bucket(), hash.as_bytes())?,
            None => None,
        };
        let bytes = bytes.ok_or_else(|| Error::new_ext(ErrorKind::MessageNotFound, hash.to_hex()))?;
        let message = Arc::new(Message { hash, bytes });
        messages[index] = Some(message.clone());
        Ok(message)
    }

    /// Merkle path from the message at `index` to the list root.
    pub fn proof(&self, index: usize) -> Result<Vec<MerkleNode>> {
        self.module.merkle_proof(&self.hashes(), index)
    }

    /// Write the hash list under the root and every message under its hash.
    pub fn flush(&self, db: &dyn Db) -> Result<()> {
        let root = match self.root() {
            Some(root) => root,
            None => return Ok(()),
        };
        db.set(self.module.list_by_merkle_root_bucket(), root.as_bytes(), &self.hashes)?;
        for index in 0..self.len() {
            let message = self.get(index)?;
            db.set(self.module.bytes_by_hash_bucket(), message.hash().as_bytes(), message.bytes())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        crypto::merkle::merkle_root_from_proof,
        db::{BucketId, MemoryDb, MockDb},
        ntm::eth::ETH,
    };

    fn create_test_list(bodies: &[&[u8]]) -> MessageList {
        let mut list = MessageList::new(&ETH);
        for body in bodies {
            list.append(body.to_vec());
        }
        list
    }

    #[test]
    fn empty_list() {
        let list = MessageList::new(&ETH);

        assert!(list.is_empty());
        assert_eq!(list.root(), None);
        assert_eq!(list.hash_at(0).unwrap_err().kind, ErrorKind::InvalidIndex);
    }

    #[test]
    fn append_invalidates_root() {
        let mut list = create_test_list(&[b"a"]);
        assert_eq!(list.root(), Some(ETH.hash(b"a")));

        list.append(b"b".to_vec());

        let expected = ETH.hash_algorithm().digest_pair(&ETH.hash(b"a"), &ETH.hash(b"b"));
        assert_eq!(list.root(), Some(expected));
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn message_proof() {
        let list = create_test_list(&[b"a", b"b", b"c"]);

        let proof = list.proof(2).unwrap();

        let leaf = list.hash_at(2).unwrap();
        assert_eq!(
            Some(merkle_root_from_proof(ETH.hash_algorithm(), &leaf, &proof)),
            list.root()
        );
    }

    #[test]
    fn flush_and_load() {
        let db = Arc::new(MemoryDb::new());
        let list = create_test_list(&[b"a", b"b", b"c"]);
        list.flush(db.as_ref()).unwrap();

        let loaded = MessageList::load(db.clone(), &ETH, list.root().as_ref()).unwrap();

        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded.get(1).unwrap().bytes(), b"b");
        assert_eq!(db.len(BucketId::ListByMerkleRoot("eth")), 1);
        assert_eq!(db.len(BucketId::TypedBytesByHash("eth")), 3);
    }

    #[test]
    fn missing_message_body() {
        let db = Arc::new(MemoryDb::new());
        let list = create_test_list(&[b"a"]);
        db.set(
            ETH.list_by_merkle_root_bucket(),
            list.root().unwrap().as_bytes(),
            list.hash_list_bytes(),
        )
        .unwrap();

        let loaded = MessageList::load(db, &ETH, list.root().as_ref()).unwrap();

        assert_eq!(loaded.get(0).unwrap_err().kind, ErrorKind::MessageNotFound);
    }

    #[test]
    fn load_corrupted_list() {
        let db = Arc::new(MemoryDb::new());
        let root = ETH.hash(b"a");
        db.set(ETH.list_by_merkle_root_bucket(), root.as_bytes(), &[0u8; 31])
            .unwrap();

        let err = MessageList::load(db, &ETH, Some(&root)).unwrap_err();

        assert_eq!(err.kind, ErrorKind::MalformedData);
    }

    #[test]
    fn flush_storage_fault() {
        let mut db = MockDb::new();
        db.expect_set()
            .returning(|_, _, _| Err(Error::new_ext(ErrorKind::DatabaseFault, "disk full")));
        let list = create_test_list(&[b"a"]);

        let err = list.flush(&db).unwrap_err();

        assert_eq!(err.kind, ErrorKind::DatabaseFault);
    }
}

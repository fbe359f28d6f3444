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

//! Section digest.
//!
//! The digest is the compact, persistable summary of a section embedded in
//! the block context:
//!
//! ```text
//! digest              = [ network_type_digest* ]
//! network_type_digest = [ ntid, uid, nts_hash, [ network_digest* ] ]
//! network_digest      = [ nid, ns_hash, messages_root | nil ]
//! ```
//!
//! Its hash is the sha3-256 of the encoding. A digest without network types
//! has neither bytes nor hash.

use crate::{
    base::codec::{Decoder, Encoder},
    btp::{
        message::MessageList,
        resolver::{DataRequester, MerkleBuilder},
        section::NetworkTypeSection,
    },
    crypto::{
        hash::{opt_bytes, opt_hash},
        Hash, HashAlgorithm, HASH_LEN,
    },
    db::{BucketId, Db},
    ntm::{self, Module},
    Error, ErrorKind, Result,
};
use once_cell::sync::OnceCell;
use std::sync::Arc;

#[derive(Clone, Debug)]
pub struct NetworkDigest {
    nid: i64,
    network_section_hash: Hash,
    messages_root: Option<Hash>,
    messages: Option<Arc<MessageList>>,
}

impl NetworkDigest {
    pub fn nid(&self) -> i64 {
        self.nid
    }

    pub fn network_section_hash(&self) -> &Hash {
        &self.network_section_hash
    }

    pub fn messages_root(&self) -> Option<&Hash> {
        self.messages_root.as_ref()
    }

    /// Messages of the network section, loaded from `db` unless the digest
    /// was produced by the builder.
    pub fn message_list(&self, db: Arc<dyn Db>, module: &'static dyn Module) -> Result<Arc<MessageList>> {
        match &self.messages {
            Some(messages) => Ok(messages.clone()),
            None => Ok(Arc::new(MessageList::load(db, module, self.messages_root.as_ref())?)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct NetworkTypeDigest {
    ntid: i64,
    uid: String,
    network_type_section_hash: Hash,
    network_digests: Vec<NetworkDigest>,
}

impl NetworkTypeDigest {
    pub fn ntid(&self) -> i64 {
        self.ntid
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn network_type_section_hash(&self) -> &Hash {
        &self.network_type_section_hash
    }

    /// Network digests, sorted by nid.
    pub fn network_digests(&self) -> &[NetworkDigest] {
        &self.network_digests
    }

    pub fn network_digest_for(&self, nid: i64) -> Result<&NetworkDigest> {
        self.network_digests
            .binary_search_by_key(&nid, |nd| nd.nid)
            .map(|pos| &self.network_digests[pos])
            .map_err(|_| Error::new_ext(ErrorKind::NetworkNotFound, format!("network {}", nid)))
    }
}

#[derive(Debug, Default)]
pub struct Digest {
    bytes: OnceCell<Option<Vec<u8>>>,
    hash: OnceCell<Option<Hash>>,
    network_type_digests: OnceCell<Vec<NetworkTypeDigest>>,
}

fn not_resolved() -> Error {
    Error::new_ext(ErrorKind::IllegalState, "digest not resolved yet")
}

fn encode(ntds: &[NetworkTypeDigest]) -> Result<Option<Vec<u8>>> {
    if ntds.is_empty() {
        return Ok(None);
    }
    let mut encoder = Encoder::new();
    encoder.write_list(ntds.len())?;
    for ntd in ntds {
        encoder.write_list(4)?;
        encoder.write_int(ntd.ntid)?;
        encoder.write_str(&ntd.uid)?;
        encoder.write_bytes(ntd.network_type_section_hash.as_bytes())?;
        encoder.write_list(ntd.network_digests.len())?;
        for nd in &ntd.network_digests {
            encoder.write_list(3)?;
            encoder.write_int(nd.nid)?;
            encoder.write_bytes(nd.network_section_hash.as_bytes())?;
            encoder.write_nullable_bytes(opt_bytes(&nd.messages_root))?;
        }
    }
    Ok(Some(encoder.into_bytes()))
}

fn expect_list(decoder: &mut Decoder, len: usize) -> Result<()> {
    let found = decoder.read_list()?;
    if found != len {
        return Err(Error::new_ext(
            ErrorKind::MalformedData,
            format!("list of {} elements, {} expected", found, len),
        ));
    }
    Ok(())
}

fn decode(bytes: &[u8]) -> Result<Vec<NetworkTypeDigest>> {
    let mut decoder = Decoder::new(bytes);
    let count = decoder.read_list()?;
    let mut ntds: Vec<NetworkTypeDigest> = Vec::with_capacity(count);
    for _ in 0..count {
        expect_list(&mut decoder, 4)?;
        let ntid = decoder.read_int()?;
        let uid = decoder.read_str()?;
        let network_type_section_hash = Hash::from_bytes(&decoder.read_bytes()?)?;
        let nd_count = decoder.read_list()?;
        let mut network_digests: Vec<NetworkDigest> = Vec::with_capacity(nd_count);
        for _ in 0..nd_count {
            expect_list(&mut decoder, 3)?;
            let nid = decoder.read_int()?;
            let network_section_hash = Hash::from_bytes(&decoder.read_bytes()?)?;
            let messages_root = opt_hash(decoder.read_nullable_bytes()?)?;
            if matches!(network_digests.last(), Some(last) if last.nid >= nid) {
                return Err(Error::new_ext(ErrorKind::MalformedData, "unordered network digests"));
            }
            network_digests.push(NetworkDigest {
                nid,
                network_section_hash,
                messages_root,
                messages: None,
            });
        }
        if matches!(ntds.last(), Some(last) if last.ntid >= ntid) {
            return Err(Error::new_ext(ErrorKind::MalformedData, "unordered network type digests"));
        }
        ntds.push(NetworkTypeDigest {
            ntid,
            uid,
            network_type_section_hash,
            network_digests,
        });
    }
    decoder.finish()?;
    Ok(ntds)
}

impl Digest {
    /// Digest of a section produced by the builder.
    pub(crate) fn from_section(network_type_sections: &[Arc<NetworkTypeSection>]) -> Self {
        let ntds = network_type_sections
            .iter()
            .map(|nts| NetworkTypeDigest {
                ntid: nts.ntid(),
                uid: nts.uid().to_string(),
                network_type_section_hash: *nts.hash(),
                network_digests: nts
                    .network_sections()
                    .iter()
                    .map(|ns| NetworkDigest {
                        nid: ns.nid(),
                        network_section_hash: *ns.hash(),
                        messages_root: ns.messages_root().copied(),
                        messages: Some(ns.messages().clone()),
                    })
                    .collect(),
            })
            .collect();
        Digest {
            network_type_digests: OnceCell::with_value(ntds),
            ..Default::default()
        }
    }

    /// Digest from its encoding. Empty input is the empty digest.
    /// Decoding is deferred to the first access.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let bytes = match bytes.is_empty() {
            true => None,
            false => Some(bytes.to_vec()),
        };
        Digest {
            bytes: OnceCell::with_value(bytes),
            ..Default::default()
        }
    }

    /// Digest stored under `hash` in the digest bucket.
    pub fn load(db: &dyn Db, hash: &Hash) -> Result<Self> {
        let bytes = db.get(BucketId::BytesByHash, hash.as_bytes())?.ok_or_else(|| {
            Error::new_ext(ErrorKind::ResourceNotFound, format!("digest {}", hash))
        })?;
        Ok(Digest::from_bytes(&bytes))
    }

    /// Digest known only by its hash. Its bytes, message lists and message
    /// bodies are requested through `builder`; the digest is usable once the
    /// builder has delivered the digest bytes.
    pub fn new_with_builder(builder: &mut dyn MerkleBuilder, hash: &Hash) -> Arc<Self> {
        let digest = Arc::new(Digest {
            hash: OnceCell::with_value(Some(*hash)),
            ..Default::default()
        });
        builder.request_data(
            BucketId::BytesByHash,
            hash.as_bytes(),
            Box::new(DigestRequester {
                digest: digest.clone(),
            }),
        );
        digest
    }

    /// Encoded digest, absent for an empty digest.
    pub fn bytes(&self) -> Result<Option<&[u8]>> {
        let bytes = self.bytes.get_or_try_init(|| {
            let ntds = self.network_type_digests.get().ok_or_else(not_resolved)?;
            encode(ntds)
        })?;
        Ok(bytes.as_deref())
    }

    /// Digest hash, absent for an empty digest.
    pub fn hash(&self) -> Result<Option<Hash>> {
        let hash = self.hash.get_or_try_init(|| {
            let bytes = self.bytes()?;
            Ok::<_, Error>(bytes.map(|bytes| HashAlgorithm::Sha3_256.digest(bytes)))
        })?;
        Ok(*hash)
    }

    /// Network type digests, sorted by ntid.
    pub fn network_type_digests(&self) -> Result<&[NetworkTypeDigest]> {
        let ntds = self.network_type_digests.get_or_try_init(|| match self.bytes.get() {
            Some(Some(bytes)) => decode(bytes),
            Some(None) => Ok(vec![]),
            None => Err(not_resolved()),
        })?;
        Ok(ntds)
    }

    pub fn network_type_digest_for(&self, ntid: i64) -> Result<&NetworkTypeDigest> {
        let ntds = self.network_type_digests()?;
        ntds.binary_search_by_key(&ntid, |ntd| ntd.ntid)
            .map(|pos| &ntds[pos])
            .map_err(|_| {
                Error::new_ext(
                    ErrorKind::NetworkTypeNotInDigest,
                    format!("network type {}", ntid),
                )
            })
    }

    pub fn network_type_ids(&self) -> Result<Vec<i64>> {
        Ok(self.network_type_digests()?.iter().map(|ntd| ntd.ntid).collect())
    }

    /// Network type of the network `nid`, if the digest has a section for it.
    pub fn network_type_id_from_nid(&self, nid: i64) -> Result<Option<i64>> {
        let ntid = self
            .network_type_digests()?
            .iter()
            .find(|ntd| ntd.network_digest_for(nid).is_ok())
            .map(|ntd| ntd.ntid);
        Ok(ntid)
    }

    /// `(ntid, nts_hash)` pairs, sorted by ntid.
    pub fn nts_hash_entries(&self) -> Result<Vec<(i64, Hash)>> {
        Ok(self
            .network_type_digests()?
            .iter()
            .map(|ntd| (ntd.ntid, ntd.network_type_section_hash))
            .collect())
    }

    /// Persist the digest bytes together with the message lists and bodies
    /// it carries.
    pub fn flush(&self, db: &dyn Db) -> Result<()> {
        let (bytes, hash) = match (self.bytes()?, self.hash()?) {
            (Some(bytes), Some(hash)) => (bytes, hash),
            _ => return Ok(()),
        };
        db.set(BucketId::BytesByHash, hash.as_bytes(), bytes)?;
        for ntd in self.network_type_digests()? {
            for nd in &ntd.network_digests {
                if let Some(messages) = &nd.messages {
                    messages.flush(db)?;
                }
            }
        }
        debug!("digest {} flushed", hash);
        Ok(())
    }
}

struct DigestRequester {
    digest: Arc<Digest>,
}

impl DataRequester for DigestRequester {
    fn on_data(self: Box<Self>, data: &[u8], builder: &mut dyn MerkleBuilder) -> Result<()> {
        let ntds = decode(data)?;
        let mut lists = Vec::new();
        for ntd in &ntds {
            let module = ntm::for_uid(&ntd.uid)?;
            for root in ntd.network_digests.iter().filter_map(|nd| nd.messages_root) {
                lists.push((module, root));
            }
        }
        // First delivery wins, later ones are dropped with their requests.
        if self.digest.bytes.set(Some(data.to_vec())).is_err() {
            warn!("digest bytes delivered twice");
            return Ok(());
        }
        // A concurrent reader may have decoded the bytes first.
        let _ = self.digest.network_type_digests.set(ntds);
        for (module, root) in lists {
            builder.request_data(
                module.list_by_merkle_root_bucket(),
                root.as_bytes(),
                Box::new(MessageListRequester { module }),
            );
        }
        Ok(())
    }
}

struct MessageListRequester {
    module: &'static dyn Module,
}

impl DataRequester for MessageListRequester {
    fn on_data(self: Box<Self>, data: &[u8], builder: &mut dyn MerkleBuilder) -> Result<()> {
        for key in data.chunks_exact(HASH_LEN) {
            builder.request_data(self.module.bytes_by_hash_bucket(), key, Box::new(MessageRequester));
        }
        Ok(())
    }
}

struct MessageRequester;

impl DataRequester for MessageRequester {
    fn on_data(self: Box<Self>, _data: &[u8], _builder: &mut dyn MerkleBuilder) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{btp::resolver::Builder, db::MemoryDb};

    const NTS_HASH: [u8; 32] = [0x11; 32];
    const NS_HASH: [u8; 32] = [0x22; 32];
    const ROOT: [u8; 32] = [0x33; 32];

    fn create_test_digest_bytes() -> Vec<u8> {
        let mut encoder = Encoder::new();
        encoder.write_list(1).unwrap();
        encoder.write_list(4).unwrap();
        encoder.write_int(1).unwrap();
        encoder.write_str("eth").unwrap();
        encoder.write_bytes(&NTS_HASH).unwrap();
        encoder.write_list(2).unwrap();
        for (nid, root) in [(2, Some(&ROOT[..])), (4, None)] {
            encoder.write_list(3).unwrap();
            encoder.write_int(nid).unwrap();
            encoder.write_bytes(&NS_HASH).unwrap();
            encoder.write_nullable_bytes(root).unwrap();
        }
        encoder.into_bytes()
    }

    #[test]
    fn empty_digest() {
        let digest = Digest::from_bytes(&[]);

        assert_eq!(digest.bytes().unwrap(), None);
        assert_eq!(digest.hash().unwrap(), None);
        assert!(digest.network_type_digests().unwrap().is_empty());

        let db = MemoryDb::new();
        digest.flush(&db).unwrap();
        assert_eq!(db.total_len(), 0);
    }

    #[test]
    fn digest_from_bytes() {
        let buf = create_test_digest_bytes();

        let digest = Digest::from_bytes(&buf);

        assert_eq!(digest.hash().unwrap(), Some(HashAlgorithm::Sha3_256.digest(&buf)));
        assert_eq!(digest.network_type_ids().unwrap(), vec![1]);
        let ntd = digest.network_type_digest_for(1).unwrap();
        assert_eq!(ntd.uid(), "eth");
        assert_eq!(ntd.network_digest_for(2).unwrap().messages_root(), Some(&Hash::new(ROOT)));
        assert_eq!(ntd.network_digest_for(4).unwrap().messages_root(), None);
        assert_eq!(digest.network_type_id_from_nid(4).unwrap(), Some(1));
        assert_eq!(digest.network_type_id_from_nid(3).unwrap(), None);
        assert_eq!(
            digest.nts_hash_entries().unwrap(),
            vec![(1, Hash::new(NTS_HASH))]
        );
        assert_eq!(
            digest.network_type_digest_for(2).unwrap_err().kind,
            ErrorKind::NetworkTypeNotInDigest
        );
    }

    #[test]
    fn digest_bytes_round_trip() {
        let buf = create_test_digest_bytes();
        let digest = Digest::from_bytes(&buf);
        let ntds = digest.network_type_digests().unwrap().to_vec();

        let encoded = encode(&ntds).unwrap().unwrap();

        assert_eq!(encoded, buf);
    }

    #[test]
    fn malformed_digest() {
        let mut buf = create_test_digest_bytes();
        buf.push(0xc0);

        let digest = Digest::from_bytes(&buf);

        assert_eq!(
            digest.network_type_digests().unwrap_err().kind,
            ErrorKind::MalformedData
        );
    }

    #[test]
    fn unordered_digest() {
        let mut encoder = Encoder::new();
        encoder.write_list(2).unwrap();
        for ntid in [2, 1] {
            encoder.write_list(4).unwrap();
            encoder.write_int(ntid).unwrap();
            encoder.write_str("eth").unwrap();
            encoder.write_bytes(&NTS_HASH).unwrap();
            encoder.write_list(0).unwrap();
        }

        let digest = Digest::from_bytes(&encoder.into_bytes());

        assert_eq!(
            digest.network_type_digests().unwrap_err().kind,
            ErrorKind::MalformedData
        );
    }

    #[test]
    fn load_digest() {
        let buf = create_test_digest_bytes();
        let hash = HashAlgorithm::Sha3_256.digest(&buf);
        let db = MemoryDb::new();

        assert_eq!(
            Digest::load(&db, &hash).unwrap_err().kind,
            ErrorKind::ResourceNotFound
        );
        db.set(BucketId::BytesByHash, hash.as_bytes(), &buf).unwrap();
        assert_eq!(Digest::load(&db, &hash).unwrap().hash().unwrap(), Some(hash));
    }

    #[derive(Default)]
    struct RequestCounter(usize);

    impl MerkleBuilder for RequestCounter {
        fn request_data(&mut self, _bucket: BucketId, _key: &[u8], _requester: Box<dyn DataRequester>) {
            self.0 += 1;
        }
    }

    #[test]
    fn concurrent_decoding() {
        let buf = create_test_digest_bytes();
        let digest = Arc::new(Digest::from_bytes(&buf));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let digest = digest.clone();
                std::thread::spawn(move || {
                    (digest.hash().unwrap(), digest.nts_hash_entries().unwrap())
                })
            })
            .collect();

        for handle in handles {
            let (hash, entries) = handle.join().unwrap();
            assert_eq!(hash, Some(HashAlgorithm::Sha3_256.digest(&buf)));
            assert_eq!(entries, vec![(1, Hash::new(NTS_HASH))]);
        }
    }

    #[test]
    fn first_delivery_wins() {
        let first = create_test_digest_bytes();
        let mut second = first.clone();
        let pos = second.windows(HASH_LEN).position(|w| w == &NTS_HASH[..]).unwrap();
        second[pos..pos + HASH_LEN].copy_from_slice(&[0x44; HASH_LEN]);
        let hash = HashAlgorithm::Sha3_256.digest(&first);
        let digest = Digest::new_with_builder(&mut RequestCounter::default(), &hash);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let data = if i % 2 == 0 { first.clone() } else { second.clone() };
                let requester = Box::new(DigestRequester {
                    digest: digest.clone(),
                });
                std::thread::spawn(move || {
                    let mut counter = RequestCounter::default();
                    requester.on_data(&data, &mut counter).unwrap();
                    counter.0
                })
            })
            .collect();
        let requests: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

        let winner = digest.bytes().unwrap().unwrap().to_vec();
        assert!(winner == first || winner == second);
        assert_eq!(
            digest.nts_hash_entries().unwrap(),
            Digest::from_bytes(&winner).nts_hash_entries().unwrap()
        );
        // One message list to fetch for the delivered digest.
        assert_eq!(requests, 1);
    }

    #[test]
    fn unresolved_digest() {
        let hash = HashAlgorithm::Sha3_256.digest(&create_test_digest_bytes());
        let mut builder = Builder::new(Arc::new(MemoryDb::new()));

        let digest = Digest::new_with_builder(&mut builder, &hash);

        assert_eq!(digest.hash().unwrap(), Some(hash));
        assert_eq!(
            digest.network_type_digests().unwrap_err().kind,
            ErrorKind::IllegalState
        );
        assert_eq!(builder.unresolved_count(), 1);
    }
}

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

//! Section rebuilt from a stored digest.
//!
//! Used to replay a block: network type sections are reconstructed on
//! demand from the digest, the state view of the block and the message
//! lists found in storage, and memoized.

use crate::{
    base::Mutex,
    btp::{
        digest::Digest,
        section::{NetworkSection, NetworkTypeSection},
        state::StateView,
    },
    db::Db,
    ntm, Error, ErrorKind, Result,
};
use std::{collections::BTreeMap, sync::Arc};

pub struct SectionFromDigest {
    digest: Arc<Digest>,
    view: Arc<dyn StateView>,
    db: Arc<dyn Db>,
    network_type_sections: Mutex<BTreeMap<i64, Arc<NetworkTypeSection>>>,
}

impl std::fmt::Debug for SectionFromDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SectionFromDigest")
            .field("digest", &self.digest.hash().ok().flatten())
            .field("loaded", &self.network_type_sections.lock().len())
            .finish()
    }
}

impl SectionFromDigest {
    /// The view must reflect the state after the execution of the block the
    /// digest belongs to.
    pub fn new(digest: Arc<Digest>, view: Arc<dyn StateView>, db: Arc<dyn Db>) -> Self {
        SectionFromDigest {
            digest,
            view,
            db,
            network_type_sections: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn digest(&self) -> Arc<Digest> {
        self.digest.clone()
    }

    pub fn view(&self) -> &dyn StateView {
        self.view.as_ref()
    }

    pub fn network_type_sections(&self) -> Result<Vec<Arc<NetworkTypeSection>>> {
        self.digest
            .network_type_ids()?
            .into_iter()
            .map(|ntid| self.network_type_section_for(ntid))
            .collect()
    }

    pub fn network_type_section_for(&self, ntid: i64) -> Result<Arc<NetworkTypeSection>> {
        let mut cache = self.network_type_sections.lock();
        if let Some(nts) = cache.get(&ntid) {
            return Ok(nts.clone());
        }

        let ntv = self.view.network_type_view(ntid).ok_or_else(|| {
            Error::new_ext(ErrorKind::NetworkTypeNotFound, format!("network type {}", ntid))
        })?;
        let module = ntm::for_uid(&ntv.uid)?;
        let ctx = module.new_proof_context_from_bytes(&ntv.next_proof_context)?;
        let ntd = self.digest.network_type_digest_for(ntid)?;
        if ntd.uid() != ntv.uid {
            return Err(Error::new_ext(
                ErrorKind::MalformedData,
                format!("network type {} is '{}' in digest, '{}' in state", ntid, ntd.uid(), ntv.uid),
            ));
        }

        let mut sections = Vec::with_capacity(ntd.network_digests().len());
        for nd in ntd.network_digests() {
            let nid = nd.nid();
            let nv = self.view.network_view(nid).ok_or_else(|| {
                Error::new_ext(ErrorKind::NetworkNotFound, format!("network {}", nid))
            })?;
            let hash = nv.last_network_section_hash.ok_or_else(|| {
                Error::new_ext(ErrorKind::IllegalState, format!("network {} has no section", nid))
            })?;
            let messages = nd.message_list(self.db.clone(), module)?;
            let first_message_sn = nv.next_message_sn - messages.len() as i64;
            let ns = NetworkSection::new(
                nid,
                first_message_sn,
                nv.next_proof_context_changed,
                nv.prev_network_section_hash,
                messages,
            )?;
            if *ns.hash() != hash || hash != *nd.network_section_hash() {
                return Err(Error::new_ext(
                    ErrorKind::MalformedData,
                    format!(
                        "network {}: section hash mismatch (state {}, digest {}, computed {})",
                        nid,
                        hash,
                        nd.network_section_hash(),
                        ns.hash()
                    ),
                ));
            }
            sections.push(ns);
        }

        // A type without network sections is only recorded for a proof
        // context change.
        let changed =
            sections.is_empty() || sections.iter().any(|ns| ns.next_proof_context_changed());
        let nts = NetworkTypeSection::new(ntid, ctx, changed, sections)?;
        if nts.hash() != ntd.network_type_section_hash() {
            return Err(Error::new_ext(
                ErrorKind::MalformedData,
                format!(
                    "network type {}: section hash mismatch (digest {}, computed {})",
                    ntid,
                    ntd.network_type_section_hash(),
                    nts.hash()
                ),
            ));
        }
        let nts = Arc::new(nts);
        cache.insert(ntid, nts.clone());
        Ok(nts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        btp::{
            builder::tests::{commit_test_section, create_test_section, create_test_view},
            section::Section,
            SectionBuilder,
        },
        db::MemoryDb,
    };

    fn create_test_replay() -> (Section, Arc<SectionFromDigest>) {
        let view = create_test_view();
        let section = create_test_section(view.clone());
        let db = Arc::new(MemoryDb::new());
        section.digest().flush(db.as_ref()).unwrap();
        commit_test_section(&view, &section);
        let replay = SectionFromDigest::new(section.digest(), view, db);
        (section, Arc::new(replay))
    }

    #[test]
    fn concurrent_lookups_share_section() {
        let (section, replay) = create_test_replay();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let replay = replay.clone();
                std::thread::spawn(move || replay.network_type_section_for(1 + i % 2).unwrap())
            })
            .collect();
        let ntss: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        for (i, nts) in ntss.iter().enumerate() {
            let first = &ntss[i % 2];
            assert!(Arc::ptr_eq(first, nts));
            let built = section.network_type_section_for(nts.ntid()).unwrap();
            assert_eq!(built.hash(), nts.hash());
        }
    }

    #[test]
    fn host_flagged_update_number_replayed() {
        let view = create_test_view();
        view.update_network(2, |nv| nv.next_proof_context_changed = true);
        let mut builder = SectionBuilder::new(view.clone());
        builder.ensure_section(2).unwrap();
        let section = builder.build().unwrap();
        let db = Arc::new(MemoryDb::new());
        section.digest().flush(db.as_ref()).unwrap();
        commit_test_section(&view, &section);

        let replay = SectionFromDigest::new(section.digest(), view, db);

        let built = section.network_type_section_for(1).unwrap();
        let replayed = replay.network_type_section_for(1).unwrap();
        let ns = replayed.network_section_for(2).unwrap();
        assert_eq!(ns.update_number(), 1);
        assert_eq!(ns.update_number(), built.network_section_for(2).unwrap().update_number());
        assert_eq!(ns.hash(), built.network_section_for(2).unwrap().hash());
        assert_eq!(replayed.hash(), built.hash());
        assert!(replayed.next_proof_context_changed());
    }

    #[test]
    fn state_not_matching_digest() {
        let view = create_test_view();
        let section = create_test_section(view.clone());
        let db = Arc::new(MemoryDb::new());
        section.digest().flush(db.as_ref()).unwrap();
        commit_test_section(&view, &section);
        view.update_network(3, |nv| nv.next_message_sn += 1);

        let replay = SectionFromDigest::new(section.digest(), view, db);

        assert_eq!(
            replay.network_type_section_for(2).unwrap_err().kind,
            ErrorKind::MalformedData
        );
        assert!(replay.network_type_section_for(1).is_ok());
    }
}

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

//! Proof context map.
//!
//! Snapshot of the validator set of every active network type, used to
//! verify the proofs attached to a block and advanced with the section of
//! every committed block. Snapshots are never modified: an update returns a
//! new map sharing nothing mutable with the original one.

use crate::{
    base::Mutex,
    btp::{digest::Digest, section::Section, state::StateView},
    ntm::{self, ProofContext},
    Error, ErrorKind, Result,
};
use std::{collections::BTreeMap, sync::Arc};

/// Effect of a section on the proof context map.
pub enum ProofContextUpdate {
    /// Contexts to set and network types to drop.
    Changes {
        changed: Vec<(i64, Arc<dyn ProofContext>)>,
        inactivated: Vec<i64>,
    },
    /// Successor map already decided.
    Replace(ProofContextMap),
}

/// Source of a proof context map update.
pub trait UpdateSource {
    fn proof_context_update(&self) -> Result<ProofContextUpdate>;
}

impl UpdateSource for Section {
    fn proof_context_update(&self) -> Result<ProofContextUpdate> {
        match self {
            Section::Built(_) => {
                let changed = self
                    .network_type_sections()?
                    .iter()
                    .filter(|nts| nts.next_proof_context_changed())
                    .map(|nts| (nts.ntid(), nts.next_proof_context().clone()))
                    .collect();
                Ok(ProofContextUpdate::Changes {
                    changed,
                    inactivated: self.inactivated_network_types().to_vec(),
                })
            }
            Section::FromDigest(section) => Ok(ProofContextUpdate::Replace(
                ProofContextMap::from_view(section.view())?,
            )),
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    contexts: BTreeMap<i64, Arc<dyn ProofContext>>,
    lock: Mutex<()>,
}

#[derive(Clone, Debug, Default)]
pub struct ProofContextMap {
    inner: Arc<Inner>,
}

impl ProofContextMap {
    /// Empty map.
    pub fn new() -> Self {
        ProofContextMap::default()
    }

    pub fn from_contexts<I>(contexts: I) -> Self
    where
        I: IntoIterator<Item = (i64, Arc<dyn ProofContext>)>,
    {
        ProofContextMap {
            inner: Arc::new(Inner {
                contexts: contexts.into_iter().collect(),
                lock: Mutex::new(()),
            }),
        }
    }

    /// Map with the current validator set of every network type with at
    /// least one open network.
    pub fn from_view(view: &dyn StateView) -> Result<Self> {
        let mut contexts = BTreeMap::new();
        for ntid in view.network_type_ids() {
            let ntv = match view.network_type_view(ntid) {
                Some(ntv) if !ntv.open_network_ids.is_empty() => ntv,
                _ => continue,
            };
            let module = ntm::for_uid(&ntv.uid)?;
            let ctx = module.new_proof_context_from_bytes(&ntv.next_proof_context)?;
            contexts.insert(ntid, ctx);
        }
        Ok(ProofContextMap::from_contexts(contexts))
    }

    pub fn proof_context_for(&self, ntid: i64) -> Result<Arc<dyn ProofContext>> {
        self.inner.contexts.get(&ntid).cloned().ok_or_else(|| {
            Error::new_ext(ErrorKind::ResourceNotFound, format!("proof context {}", ntid))
        })
    }

    /// Network types with a proof context, sorted.
    pub fn network_type_ids(&self) -> Vec<i64> {
        self.inner.contexts.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.contexts.is_empty()
    }

    /// Successor map after the block described by `source`.
    pub fn update(&self, source: &dyn UpdateSource) -> Result<ProofContextMap> {
        let _guard = self.inner.lock.lock();
        match source.proof_context_update()? {
            ProofContextUpdate::Replace(map) => Ok(map),
            ProofContextUpdate::Changes {
                changed,
                inactivated,
            } => {
                let mut contexts = self.inner.contexts.clone();
                for (ntid, ctx) in changed {
                    debug!("network type {}: proof context {}", ntid, ctx.hash());
                    contexts.insert(ntid, ctx);
                }
                for ntid in inactivated {
                    debug!("network type {}: inactivated", ntid);
                    contexts.remove(&ntid);
                }
                Ok(ProofContextMap::from_contexts(contexts))
            }
        }
    }

    /// Verify the proofs of the block with the given digest. One proof is
    /// expected for every network type of the digest having a proof context
    /// in this map, in digest order.
    pub fn verify(
        &self,
        src_network_uid: &[u8],
        height: i64,
        round: i32,
        digest: &Digest,
        proofs: &[Vec<u8>],
    ) -> Result<()> {
        let _guard = self.inner.lock.lock();
        let ntds: Vec<_> = digest
            .network_type_digests()?
            .iter()
            .filter(|ntd| self.inner.contexts.contains_key(&ntd.ntid()))
            .collect();
        if ntds.len() != proofs.len() {
            return Err(Error::new_ext(
                ErrorKind::ProofCountMismatch,
                format!("{} proofs for {} network types", proofs.len(), ntds.len()),
            ));
        }
        for (ntd, proof) in ntds.into_iter().zip(proofs) {
            let ctx = self.proof_context_for(ntd.ntid())?;
            let decision = ctx.new_decision(
                src_network_uid,
                ntd.ntid(),
                height,
                round,
                ntd.network_type_section_hash(),
            )?;
            let proof = ctx.new_proof_from_bytes(proof)?;
            ctx.verify(&decision.hash(), &proof)?;
        }
        Ok(())
    }
}

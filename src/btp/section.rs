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

//! BTP sections.
//!
//! A section is the per block summary of the outbound messaging activity.
//! It is an ordered list of network type sections, each committing through a
//! Merkle root to the ordered list of its network sections. A section is
//! either produced by the builder while executing a block or rebuilt from a
//! stored digest; both variants expose the same accessors and produce the
//! same hashes for the same inputs.

use crate::{
    base::codec::Encoder,
    btp::{digest::Digest, from_digest::SectionFromDigest, message::MessageList},
    crypto::{hash::opt_bytes, Hash, MerkleNode},
    ntm::{Decision, Module, ProofContext},
    Error, ErrorKind, Result,
};
use std::sync::Arc;

/// Network section.
#[derive(Clone, Debug)]
pub struct NetworkSection {
    nid: i64,
    update_number: i64,
    prev_hash: Option<Hash>,
    message_count: i64,
    messages_root: Option<Hash>,
    hash: Hash,
    messages: Arc<MessageList>,
}

/// Encoding of the network section hash input.
fn network_section_bytes(
    nid: i64,
    update_number: i64,
    prev_hash: &Option<Hash>,
    message_count: i64,
    messages_root: &Option<Hash>,
) -> Result<Vec<u8>> {
    let mut encoder = Encoder::new();
    encoder.write_list(5)?;
    encoder.write_int(nid)?;
    encoder.write_int(update_number)?;
    encoder.write_nullable_bytes(opt_bytes(prev_hash))?;
    encoder.write_int(message_count)?;
    encoder.write_nullable_bytes(opt_bytes(messages_root))?;
    Ok(encoder.into_bytes())
}

impl NetworkSection {
    /// Section of network `nid` carrying `messages`.
    pub(crate) fn new(
        nid: i64,
        first_message_sn: i64,
        next_proof_context_changed: bool,
        prev_hash: Option<Hash>,
        messages: Arc<MessageList>,
    ) -> Result<Self> {
        if first_message_sn < 0 {
            return Err(Error::new_ext(
                ErrorKind::IllegalState,
                format!("network {}: negative first message sn", nid),
            ));
        }
        let update_number = (first_message_sn << 1) | next_proof_context_changed as i64;
        let message_count = messages.len() as i64;
        let messages_root = messages.root();
        let bytes = network_section_bytes(nid, update_number, &prev_hash, message_count, &messages_root)?;
        let hash = messages.module().hash(&bytes);
        Ok(NetworkSection {
            nid,
            update_number,
            prev_hash,
            message_count,
            messages_root,
            hash,
            messages,
        })
    }

    pub fn nid(&self) -> i64 {
        self.nid
    }

    /// `first_message_sn << 1 | next_proof_context_changed`.
    pub fn update_number(&self) -> i64 {
        self.update_number
    }

    pub fn first_message_sn(&self) -> i64 {
        self.update_number >> 1
    }

    pub fn next_proof_context_changed(&self) -> bool {
        self.update_number & 1 == 1
    }

    pub fn prev_hash(&self) -> Option<&Hash> {
        self.prev_hash.as_ref()
    }

    pub fn message_count(&self) -> i64 {
        self.message_count
    }

    pub fn messages_root(&self) -> Option<&Hash> {
        self.messages_root.as_ref()
    }

    pub fn hash(&self) -> &Hash {
        &self.hash
    }

    pub fn messages(&self) -> &Arc<MessageList> {
        &self.messages
    }
}

/// Network type section.
#[derive(Debug)]
pub struct NetworkTypeSection {
    ntid: i64,
    next_proof_context: Arc<dyn ProofContext>,
    next_proof_context_changed: bool,
    network_sections: Vec<NetworkSection>,
    network_sections_root: Option<Hash>,
    hash: Hash,
}

impl NetworkTypeSection {
    /// Network sections must be sorted by nid without repetitions.
    pub(crate) fn new(
        ntid: i64,
        next_proof_context: Arc<dyn ProofContext>,
        next_proof_context_changed: bool,
        network_sections: Vec<NetworkSection>,
    ) -> Result<Self> {
        if network_sections.windows(2).any(|w| w[0].nid >= w[1].nid) {
            return Err(Error::new_ext(
                ErrorKind::IllegalState,
                format!("network type {}: unordered network sections", ntid),
            ));
        }
        let module = next_proof_context.module();
        let hashes: Vec<Hash> = network_sections.iter().map(|ns| ns.hash).collect();
        let network_sections_root = module.merkle_root(&hashes);
        let mut encoder = Encoder::new();
        encoder.write_list(2)?;
        encoder.write_bytes(next_proof_context.hash().as_bytes())?;
        encoder.write_nullable_bytes(opt_bytes(&network_sections_root))?;
        let hash = module.hash(&encoder.into_bytes());
        Ok(NetworkTypeSection {
            ntid,
            next_proof_context,
            next_proof_context_changed,
            network_sections,
            network_sections_root,
            hash,
        })
    }

    pub fn ntid(&self) -> i64 {
        self.ntid
    }

    pub fn module(&self) -> &'static dyn Module {
        self.next_proof_context.module()
    }

    pub fn uid(&self) -> &'static str {
        self.module().uid()
    }

    /// Validator set in charge of the next decisions.
    pub fn next_proof_context(&self) -> &Arc<dyn ProofContext> {
        &self.next_proof_context
    }

    pub fn next_proof_context_changed(&self) -> bool {
        self.next_proof_context_changed
    }

    /// Network sections, sorted by nid.
    pub fn network_sections(&self) -> &[NetworkSection] {
        &self.network_sections
    }

    pub fn network_section_for(&self, nid: i64) -> Result<&NetworkSection> {
        self.position_of(nid).map(|pos| &self.network_sections[pos])
    }

    pub fn network_sections_root(&self) -> Option<&Hash> {
        self.network_sections_root.as_ref()
    }

    pub fn hash(&self) -> &Hash {
        &self.hash
    }

    /// Merkle path from the section of `nid` to the network sections root.
    pub fn network_section_to_root(&self, nid: i64) -> Result<Vec<MerkleNode>> {
        let pos = self.position_of(nid)?;
        let hashes: Vec<Hash> = self.network_sections.iter().map(|ns| ns.hash).collect();
        self.module().merkle_proof(&hashes, pos)
    }

    /// Decision over this section for the destination validators.
    pub fn new_decision(&self, src_network_uid: &[u8], height: i64, round: i32) -> Result<Decision> {
        Decision::new(self.module(), src_network_uid, self.ntid, height, round, &self.hash)
    }

    fn position_of(&self, nid: i64) -> Result<usize> {
        self.network_sections
            .binary_search_by_key(&nid, |ns| ns.nid)
            .map_err(|_| Error::new_ext(ErrorKind::NetworkNotFound, format!("network {}", nid)))
    }
}

/// Section produced by the builder.
#[derive(Debug)]
pub struct BuiltSection {
    network_type_sections: Vec<Arc<NetworkTypeSection>>,
    inactivated_network_types: Vec<i64>,
    digest: Arc<Digest>,
}

impl BuiltSection {
    /// Network type sections must be sorted by ntid without repetitions.
    pub(crate) fn new(
        network_type_sections: Vec<Arc<NetworkTypeSection>>,
        inactivated_network_types: Vec<i64>,
    ) -> Self {
        let digest = Arc::new(Digest::from_section(&network_type_sections));
        BuiltSection {
            network_type_sections,
            inactivated_network_types,
            digest,
        }
    }
}

/// BTP section of a block.
#[derive(Debug)]
pub enum Section {
    Built(BuiltSection),
    FromDigest(SectionFromDigest),
}

impl Section {
    pub fn digest(&self) -> Arc<Digest> {
        match self {
            Section::Built(section) => section.digest.clone(),
            Section::FromDigest(section) => section.digest(),
        }
    }

    /// Network type sections, sorted by ntid.
    pub fn network_type_sections(&self) -> Result<Vec<Arc<NetworkTypeSection>>> {
        match self {
            Section::Built(section) => Ok(section.network_type_sections.clone()),
            Section::FromDigest(section) => section.network_type_sections(),
        }
    }

    pub fn network_type_section_for(&self, ntid: i64) -> Result<Arc<NetworkTypeSection>> {
        match self {
            Section::Built(section) => section
                .network_type_sections
                .binary_search_by_key(&ntid, |nts| nts.ntid)
                .map(|pos| section.network_type_sections[pos].clone())
                .map_err(|_| {
                    Error::new_ext(
                        ErrorKind::NetworkTypeNotFound,
                        format!("network type {}", ntid),
                    )
                }),
            Section::FromDigest(section) => section.network_type_section_for(ntid),
        }
    }

    /// Network types deactivated by the block. Only known to the builder.
    pub fn inactivated_network_types(&self) -> &[i64] {
        match self {
            Section::Built(section) => &section.inactivated_network_types,
            Section::FromDigest(_) => &[],
        }
    }
}

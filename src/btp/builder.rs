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

//! Section builder.
//!
//! Collects the messaging effects of the transactions of a block and turns
//! them into the block section. Effects are recorded in a stack of frames:
//! every transaction pushes a frame, committing merges it into the frame
//! below and discarding drops it. The builder never touches storage.

use crate::{
    btp::{
        message::MessageList,
        section::{BuiltSection, NetworkSection, NetworkTypeSection, Section},
        state::{NetworkView, StateView},
    },
    ntm, Error, ErrorKind, Result,
};
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

/// Pending effects of a transaction.
#[derive(Debug, Default)]
struct Frame {
    messages: BTreeMap<i64, Vec<Vec<u8>>>,
    proof_contexts: BTreeMap<i64, Vec<u8>>,
    inactivated: BTreeSet<i64>,
}

impl Frame {
    fn merge(&mut self, other: Frame) {
        for (nid, mut messages) in other.messages {
            self.messages.entry(nid).or_default().append(&mut messages);
        }
        self.proof_contexts.extend(other.proof_contexts);
        self.inactivated.extend(other.inactivated);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Open,
    Finalized,
}

pub struct SectionBuilder {
    view: Arc<dyn StateView>,
    frames: Vec<Frame>,
    state: State,
}

impl SectionBuilder {
    pub fn new(view: Arc<dyn StateView>) -> Self {
        SectionBuilder {
            view,
            frames: vec![Frame::default()],
            state: State::Open,
        }
    }

    fn check_open(&self) -> Result<()> {
        match self.state {
            State::Open => Ok(()),
            State::Finalized => Err(Error::new(ErrorKind::BuilderFinalized)),
        }
    }

    fn top(&mut self) -> &mut Frame {
        // The base frame is never popped.
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    /// Nested scope. Effects recorded through the returned handle are
    /// dropped unless the handle is committed.
    pub fn begin_transaction(&mut self) -> Transaction<'_> {
        self.frames.push(Frame::default());
        Transaction {
            builder: self,
            done: false,
        }
    }

    /// Queue a message for the network `nid`.
    pub fn send_message(&mut self, nid: i64, message: Vec<u8>) -> Result<()> {
        self.check_open()?;
        let nv = self.view.network_view(nid).ok_or_else(|| {
            Error::new_ext(ErrorKind::NetworkNotFound, format!("network {}", nid))
        })?;
        if !nv.open {
            return Err(Error::new_ext(ErrorKind::NetworkClosed, format!("network {}", nid)));
        }
        self.top().messages.entry(nid).or_default().push(message);
        Ok(())
    }

    /// Emit a section for the network `nid` even without messages.
    pub fn ensure_section(&mut self, nid: i64) -> Result<()> {
        self.check_open()?;
        if self.view.network_view(nid).is_none() {
            return Err(Error::new_ext(ErrorKind::NetworkNotFound, format!("network {}", nid)));
        }
        self.top().messages.entry(nid).or_default();
        Ok(())
    }

    /// Replace the validator set of the network type `ntid`. The type gets a
    /// section in the block, and every open network of the type a network
    /// section signalling the change.
    pub fn set_next_proof_context(&mut self, ntid: i64, bytes: Vec<u8>) -> Result<()> {
        self.check_open()?;
        let ntv = self.view.network_type_view(ntid).ok_or_else(|| {
            Error::new_ext(ErrorKind::NetworkTypeNotFound, format!("network type {}", ntid))
        })?;
        ntm::for_uid(&ntv.uid)?.new_proof_context_from_bytes(&bytes)?;
        let frame = self.top();
        for nid in ntv.open_network_ids {
            frame.messages.entry(nid).or_default();
        }
        frame.proof_contexts.insert(ntid, bytes);
        Ok(())
    }

    pub fn deactivate_network_type(&mut self, ntid: i64) -> Result<()> {
        self.check_open()?;
        self.top().inactivated.insert(ntid);
        Ok(())
    }

    /// Produce the section of the block. The builder is unusable afterwards.
    pub fn build(&mut self) -> Result<Section> {
        self.check_open()?;
        self.state = State::Finalized;
        let mut frame = std::mem::take(self.top());

        // Networks already flagged by the host must signal the change too.
        for ntid in self.view.network_type_ids() {
            if let Some(ntv) = self.view.network_type_view(ntid) {
                for nid in ntv.open_network_ids {
                    if self.view.network_view(nid).map_or(false, |nv| nv.next_proof_context_changed) {
                        frame.messages.entry(nid).or_default();
                    }
                }
            }
        }

        let mut networks_by_type: BTreeMap<i64, Vec<(i64, NetworkView, Vec<Vec<u8>>)>> = BTreeMap::new();
        for ntid in frame.proof_contexts.keys() {
            networks_by_type.entry(*ntid).or_default();
        }
        for (nid, messages) in frame.messages {
            let nv = self.view.network_view(nid).ok_or_else(|| {
                Error::new_ext(ErrorKind::NetworkNotFound, format!("network {}", nid))
            })?;
            networks_by_type
                .entry(nv.network_type_id)
                .or_default()
                .push((nid, nv, messages));
        }

        let mut network_type_sections = Vec::with_capacity(networks_by_type.len());
        for (ntid, networks) in networks_by_type {
            let ntv = self.view.network_type_view(ntid).ok_or_else(|| {
                Error::new_ext(ErrorKind::NetworkTypeNotFound, format!("network type {}", ntid))
            })?;
            let module = ntm::for_uid(&ntv.uid)?;
            let changed = frame.proof_contexts.contains_key(&ntid);
            let ctx_bytes = frame
                .proof_contexts
                .get(&ntid)
                .unwrap_or(&ntv.next_proof_context);
            let ctx = module.new_proof_context_from_bytes(ctx_bytes)?;

            let mut sections = Vec::with_capacity(networks.len());
            for (nid, nv, messages) in networks {
                let mut list = MessageList::new(module);
                for message in messages {
                    list.append(message);
                }
                sections.push(NetworkSection::new(
                    nid,
                    nv.next_message_sn - list.len() as i64,
                    changed || nv.next_proof_context_changed,
                    nv.last_network_section_hash,
                    Arc::new(list),
                )?);
            }
            let type_changed = changed || sections.iter().any(|ns| ns.next_proof_context_changed());
            network_type_sections.push(Arc::new(NetworkTypeSection::new(ntid, ctx, type_changed, sections)?));
        }

        let inactivated: Vec<i64> = frame.inactivated.into_iter().collect();
        debug!(
            "section built: {} network types, {} inactivated",
            network_type_sections.len(),
            inactivated.len()
        );
        Ok(Section::Built(BuiltSection::new(network_type_sections, inactivated)))
    }
}

/// Transaction handle.
pub struct Transaction<'a> {
    builder: &'a mut SectionBuilder,
    done: bool,
}

impl<'a> Transaction<'a> {
    pub fn begin_transaction(&mut self) -> Transaction<'_> {
        self.builder.begin_transaction()
    }

    pub fn send_message(&mut self, nid: i64, message: Vec<u8>) -> Result<()> {
        self.builder.send_message(nid, message)
    }

    pub fn ensure_section(&mut self, nid: i64) -> Result<()> {
        self.builder.ensure_section(nid)
    }

    pub fn set_next_proof_context(&mut self, ntid: i64, bytes: Vec<u8>) -> Result<()> {
        self.builder.set_next_proof_context(ntid, bytes)
    }

    pub fn deactivate_network_type(&mut self, ntid: i64) -> Result<()> {
        self.builder.deactivate_network_type(ntid)
    }

    /// Merge the effects into the enclosing scope.
    pub fn commit(mut self) {
        self.done = true;
        if let Some(frame) = self.builder.frames.pop() {
            self.builder.top().merge(frame);
        }
    }

    /// Drop the effects.
    pub fn discard(mut self) {
        self.done = true;
        self.builder.frames.pop();
    }
}

impl<'a> Drop for Transaction<'a> {
    fn drop(&mut self) {
        if !self.done {
            self.builder.frames.pop();
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{
        base::codec::Encoder,
        btp::state::tests::TestStateView,
        crypto::{secp256k1::tests::create_test_keypair, HashAlgorithm},
        ntm::{eth::ETH, Module},
    };

    /// Two `eth` network types, `1` with networks `1, 2` and `2` with
    /// networks `3, 4`.
    pub fn create_test_view() -> Arc<TestStateView> {
        let view = TestStateView::default();
        view.add_network_type(1, "eth", &[create_test_keypair(0), create_test_keypair(1)]);
        view.add_network_type(2, "eth", &[create_test_keypair(2)]);
        view.add_network(1, 1, 2);
        view.add_network(2, 1, 0);
        view.add_network(3, 2, 3);
        view.add_network(4, 2, 0);
        Arc::new(view)
    }

    /// Section of the test view with messages on networks `1` and `3`.
    pub fn create_test_section(view: Arc<TestStateView>) -> Section {
        let mut builder = SectionBuilder::new(view);
        builder.ensure_section(2).unwrap();
        builder.send_message(1, b"a".to_vec()).unwrap();
        builder.ensure_section(4).unwrap();
        builder.send_message(3, b"b".to_vec()).unwrap();
        builder.send_message(3, b"c".to_vec()).unwrap();
        builder.send_message(3, b"d".to_vec()).unwrap();
        builder.build().unwrap()
    }

    /// Host side commit of the section into the view.
    pub fn commit_test_section(view: &TestStateView, section: &Section) {
        for nts in section.network_type_sections().unwrap() {
            for ns in nts.network_sections() {
                view.update_network(ns.nid(), |nv| {
                    nv.apply_section(*ns.hash(), ns.next_proof_context_changed())
                });
            }
            let ctx = nts.next_proof_context().clone();
            view.update_network_type(nts.ntid(), |ntv| {
                ntv.next_proof_context = ctx.bytes().to_vec();
                ntv.next_proof_context_hash = Some(ctx.hash());
            });
        }
    }

    fn message_count(section: &Section, ntid: i64, nid: i64) -> i64 {
        section
            .network_type_section_for(ntid)
            .unwrap()
            .network_section_for(nid)
            .unwrap()
            .message_count()
    }

    #[test]
    fn empty_block() {
        let mut builder = SectionBuilder::new(create_test_view());

        let section = builder.build().unwrap();

        assert!(section.network_type_sections().unwrap().is_empty());
        assert_eq!(section.digest().bytes().unwrap(), None);
        assert_eq!(section.digest().hash().unwrap(), None);
    }

    #[test]
    fn single_message() {
        let view = TestStateView::default();
        view.add_network_type(1, "eth", &[create_test_keypair(0)]);
        view.add_network(2, 1, 2);
        let ctx_hash = view.network_type_view(1).unwrap().next_proof_context_hash.unwrap();
        let mut builder = SectionBuilder::new(Arc::new(view));

        builder.send_message(2, b"a".to_vec()).unwrap();
        let section = builder.build().unwrap();

        let mut encoder = Encoder::new();
        encoder.write_list(5).unwrap();
        encoder.write_int(2).unwrap();
        encoder.write_int(2).unwrap();
        encoder.write_nil().unwrap();
        encoder.write_int(1).unwrap();
        encoder.write_bytes(ETH.hash(b"a").as_bytes()).unwrap();
        let ns_hash = HashAlgorithm::Keccak256.digest(&encoder.into_bytes());

        let mut encoder = Encoder::new();
        encoder.write_list(2).unwrap();
        encoder.write_bytes(ctx_hash.as_bytes()).unwrap();
        encoder.write_bytes(ns_hash.as_bytes()).unwrap();
        let nts_hash = HashAlgorithm::Keccak256.digest(&encoder.into_bytes());

        let nts = section.network_type_section_for(1).unwrap();
        assert_eq!(*nts.network_section_for(2).unwrap().hash(), ns_hash);
        assert_eq!(*nts.hash(), nts_hash);
    }

    #[test]
    fn multi_network_multi_type() {
        let mut builder = SectionBuilder::new(create_test_view());

        builder.ensure_section(2).unwrap();
        builder.send_message(1, b"a".to_vec()).unwrap();
        builder.ensure_section(4).unwrap();
        builder.send_message(3, b"b".to_vec()).unwrap();
        builder.send_message(3, b"c".to_vec()).unwrap();
        builder.send_message(3, b"d".to_vec()).unwrap();
        let section = builder.build().unwrap();

        let ntss = section.network_type_sections().unwrap();
        assert_eq!(ntss.iter().map(|nts| nts.ntid()).collect::<Vec<_>>(), vec![1, 2]);
        for nts in &ntss {
            assert_eq!(nts.network_sections().len(), 2);
        }
        let nts = section.network_type_section_for(2).unwrap();
        let hashes = [ETH.hash(b"b"), ETH.hash(b"c"), ETH.hash(b"d")];
        assert_eq!(
            nts.network_section_for(3).unwrap().messages_root().copied(),
            ETH.merkle_root(&hashes)
        );
        assert_eq!(nts.network_section_for(4).unwrap().messages_root(), None);
        assert_eq!(nts.network_section_for(3).unwrap().first_message_sn(), 0);
    }

    #[test]
    fn send_to_unknown_or_closed_network() {
        let view = create_test_view();
        view.update_network(2, |nv| nv.open = false);
        let mut builder = SectionBuilder::new(view);

        assert_eq!(
            builder.send_message(9, b"a".to_vec()).unwrap_err().kind,
            ErrorKind::NetworkNotFound
        );
        assert_eq!(
            builder.send_message(2, b"a".to_vec()).unwrap_err().kind,
            ErrorKind::NetworkClosed
        );
    }

    #[test]
    fn nested_transactions() {
        let mut builder = SectionBuilder::new(create_test_view());
        {
            let mut tx = builder.begin_transaction();
            tx.send_message(1, b"a".to_vec()).unwrap();
            {
                let mut inner = tx.begin_transaction();
                inner.send_message(1, b"b".to_vec()).unwrap();
                inner.discard();
            }
            {
                let mut inner = tx.begin_transaction();
                inner.send_message(1, b"c".to_vec()).unwrap();
                inner.commit();
            }
            tx.commit();
        }
        {
            let mut tx = builder.begin_transaction();
            tx.send_message(3, b"d".to_vec()).unwrap();
            // Dropped without commit.
        }

        let section = builder.build().unwrap();

        assert_eq!(message_count(&section, 1, 1), 2);
        let ns = section
            .network_type_section_for(1)
            .unwrap()
            .network_section_for(1)
            .unwrap()
            .messages()
            .clone();
        assert_eq!(ns.get(0).unwrap().bytes(), b"a");
        assert_eq!(ns.get(1).unwrap().bytes(), b"c");
        assert_eq!(
            section.network_type_section_for(2).unwrap_err().kind,
            ErrorKind::NetworkTypeNotFound
        );
    }

    #[test]
    fn discarded_outer_transaction() {
        let mut builder = SectionBuilder::new(create_test_view());
        {
            let mut tx = builder.begin_transaction();
            tx.send_message(1, b"a".to_vec()).unwrap();
            tx.deactivate_network_type(2).unwrap();
            tx.discard();
        }

        let section = builder.build().unwrap();

        assert!(section.network_type_sections().unwrap().is_empty());
        assert!(section.inactivated_network_types().is_empty());
    }

    #[test]
    fn next_proof_context_change() {
        let view = create_test_view();
        let keys = vec![create_test_keypair(5).public_key().to_uncompressed()];
        let ctx = ETH.new_proof_context(&keys).unwrap();
        let mut builder = SectionBuilder::new(view);

        builder.set_next_proof_context(1, ctx.bytes().to_vec()).unwrap();
        builder.deactivate_network_type(2).unwrap();
        let section = builder.build().unwrap();

        let nts = section.network_type_section_for(1).unwrap();
        assert!(nts.next_proof_context_changed());
        assert_eq!(nts.next_proof_context().hash(), ctx.hash());
        assert_eq!(nts.network_sections().len(), 2);
        assert!(nts.network_sections().iter().all(|ns| ns.next_proof_context_changed()));
        assert_eq!(section.inactivated_network_types(), &[2]);
    }

    #[test]
    fn host_flagged_network_signals_change() {
        let view = create_test_view();
        view.update_network(2, |nv| nv.next_proof_context_changed = true);
        let mut builder = SectionBuilder::new(view);

        builder.send_message(1, b"a".to_vec()).unwrap();
        let section = builder.build().unwrap();

        let nts = section.network_type_section_for(1).unwrap();
        assert!(nts.next_proof_context_changed());
        let ns = nts.network_section_for(2).unwrap();
        assert_eq!(ns.update_number(), 1);
        assert_eq!(ns.message_count(), 0);
        // Network 1 is not flagged and no change was recorded in the block.
        assert_eq!(nts.network_section_for(1).unwrap().update_number(), 2);
    }

    #[test]
    fn proof_context_change_without_open_networks() {
        let view = create_test_view();
        view.update_network_type(2, |ntv| ntv.open_network_ids.clear());
        let keys = vec![create_test_keypair(7).public_key().to_uncompressed()];
        let ctx = ETH.new_proof_context(&keys).unwrap();
        let mut builder = SectionBuilder::new(view);

        builder.set_next_proof_context(2, ctx.bytes().to_vec()).unwrap();
        let section = builder.build().unwrap();

        let ntss = section.network_type_sections().unwrap();
        assert_eq!(ntss.len(), 1);
        assert_eq!(ntss[0].ntid(), 2);
        assert!(ntss[0].next_proof_context_changed());
        assert!(ntss[0].network_sections().is_empty());
        assert_eq!(ntss[0].network_sections_root(), None);
        assert_eq!(ntss[0].next_proof_context().hash(), ctx.hash());
        assert_eq!(section.digest().network_type_ids().unwrap(), vec![2]);
    }

    #[test]
    fn bad_next_proof_context() {
        let mut builder = SectionBuilder::new(create_test_view());

        let err = builder.set_next_proof_context(1, vec![0xc1]).unwrap_err();

        assert_eq!(err.kind, ErrorKind::MalformedData);
        assert_eq!(
            builder.set_next_proof_context(7, vec![]).unwrap_err().kind,
            ErrorKind::NetworkTypeNotFound
        );
    }

    #[test]
    fn build_twice() {
        let mut builder = SectionBuilder::new(create_test_view());
        builder.build().unwrap();

        assert_eq!(builder.build().unwrap_err().kind, ErrorKind::BuilderFinalized);
        assert_eq!(
            builder.send_message(1, b"a".to_vec()).unwrap_err().kind,
            ErrorKind::BuilderFinalized
        );
    }

    #[test]
    fn inconsistent_message_sn() {
        let view = create_test_view();
        view.update_network(1, |nv| nv.next_message_sn = 0);
        let mut builder = SectionBuilder::new(view);
        builder.send_message(1, b"a".to_vec()).unwrap();

        assert_eq!(builder.build().unwrap_err().kind, ErrorKind::IllegalState);
    }
}

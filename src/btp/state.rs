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

//! Read-only view of the host state consulted by the section engine.

use crate::crypto::Hash;

/// Network state as seen at block execution time.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkView {
    /// Network name.
    pub name: String,
    /// Network owner account.
    #[serde(with = "serde_bytes")]
    pub owner: Vec<u8>,
    /// Owning network type.
    pub network_type_id: i64,
    /// Network accepts messages.
    pub open: bool,
    /// Sequence number of the next message, already advanced by the host for
    /// the messages sent in the current block.
    pub next_message_sn: i64,
    /// The validator set of the network type changed in the current block.
    /// In committed state, the last section of the network signalled it.
    pub next_proof_context_changed: bool,
    /// Hash of the section preceding the last one.
    pub prev_network_section_hash: Option<Hash>,
    /// Hash of the last committed section.
    pub last_network_section_hash: Option<Hash>,
}

impl NetworkView {
    /// Clear the proof context change flag before executing a block.
    pub fn begin_block(&mut self) {
        self.next_proof_context_changed = false;
    }

    /// Record `hash` as the last committed section of the network.
    /// `next_message_sn` is left alone: the host advanced it by the message
    /// count while the block was executed, so the committed state already
    /// carries the advance.
    pub fn apply_section(&mut self, hash: Hash, next_proof_context_changed: bool) {
        self.prev_network_section_hash = self.last_network_section_hash.take();
        self.last_network_section_hash = Some(hash);
        self.next_proof_context_changed = next_proof_context_changed;
    }
}

/// Network type state.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkTypeView {
    /// Module UID.
    pub uid: String,
    /// Hash of `next_proof_context`.
    pub next_proof_context_hash: Option<Hash>,
    /// Serialized validator set.
    #[serde(with = "serde_bytes")]
    pub next_proof_context: Vec<u8>,
    /// Open networks of the type, sorted.
    pub open_network_ids: Vec<i64>,
}

/// Host state accessors.
pub trait StateView: Send + Sync {
    /// Registered network types, sorted.
    fn network_type_ids(&self) -> Vec<i64>;

    fn network_view(&self, nid: i64) -> Option<NetworkView>;

    fn network_type_view(&self, ntid: i64) -> Option<NetworkTypeView>;
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{
        base::{serialize::MessagePack, RwLock},
        crypto::secp256k1::KeyPair,
        ntm,
    };
    use std::collections::BTreeMap;

    /// State view backed by in-memory maps.
    #[derive(Default)]
    pub struct TestStateView {
        networks: RwLock<BTreeMap<i64, NetworkView>>,
        network_types: RwLock<BTreeMap<i64, NetworkTypeView>>,
    }

    impl TestStateView {
        pub fn add_network_type(&self, ntid: i64, uid: &str, validators: &[KeyPair]) {
            let module = ntm::for_uid(uid).unwrap();
            let keys: Vec<_> = validators
                .iter()
                .map(|kp| kp.public_key().to_uncompressed())
                .collect();
            let ctx = module.new_proof_context(&keys).unwrap();
            self.network_types.write().insert(
                ntid,
                NetworkTypeView {
                    uid: uid.to_string(),
                    next_proof_context_hash: Some(ctx.hash()),
                    next_proof_context: ctx.bytes().to_vec(),
                    open_network_ids: vec![],
                },
            );
        }

        pub fn add_network(&self, nid: i64, ntid: i64, next_message_sn: i64) {
            let mut types = self.network_types.write();
            let ntv = types.get_mut(&ntid).unwrap();
            ntv.open_network_ids.push(nid);
            ntv.open_network_ids.sort_unstable();
            self.networks.write().insert(
                nid,
                NetworkView {
                    name: format!("net-{}", nid),
                    owner: vec![0xaa; 20],
                    network_type_id: ntid,
                    open: true,
                    next_message_sn,
                    ..Default::default()
                },
            );
        }

        pub fn update_network<F: FnOnce(&mut NetworkView)>(&self, nid: i64, f: F) {
            f(self.networks.write().get_mut(&nid).unwrap());
        }

        pub fn update_network_type<F: FnOnce(&mut NetworkTypeView)>(&self, ntid: i64, f: F) {
            f(self.network_types.write().get_mut(&ntid).unwrap());
        }
    }

    impl StateView for TestStateView {
        fn network_type_ids(&self) -> Vec<i64> {
            self.network_types.read().keys().copied().collect()
        }

        fn network_view(&self, nid: i64) -> Option<NetworkView> {
            self.networks.read().get(&nid).cloned()
        }

        fn network_type_view(&self, ntid: i64) -> Option<NetworkTypeView> {
            self.network_types.read().get(&ntid).cloned()
        }
    }

    #[test]
    fn apply_section_advances_hashes() {
        let mut view = NetworkView::default();
        let first = Hash::new([1; 32]);
        let second = Hash::new([2; 32]);

        view.apply_section(first, true);
        view.apply_section(second, false);

        assert_eq!(view.prev_network_section_hash, Some(first));
        assert_eq!(view.last_network_section_hash, Some(second));
        assert!(!view.next_proof_context_changed);
    }

    #[test]
    fn begin_block_clears_flag() {
        let mut view = NetworkView {
            next_message_sn: 4,
            ..Default::default()
        };
        view.apply_section(Hash::new([1; 32]), true);

        view.begin_block();

        assert!(!view.next_proof_context_changed);
        assert_eq!(view.last_network_section_hash, Some(Hash::new([1; 32])));
        assert_eq!(view.next_message_sn, 4);
    }

    #[test]
    fn network_view_persistence() {
        let mut view = NetworkView {
            name: "relay".to_string(),
            owner: vec![1, 2, 3],
            network_type_id: 1,
            open: true,
            next_message_sn: 5,
            ..Default::default()
        };
        view.apply_section(Hash::new([3; 32]), false);

        let buf = MessagePack::serialize(&view).unwrap();
        let restored = <NetworkView as MessagePack>::deserialize(&buf).unwrap();

        assert_eq!(restored, view);
    }
}

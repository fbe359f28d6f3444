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

//! Consensus decision over a network type section.

use crate::{base::codec::Encoder, crypto::Hash, ntm::Module, Result};

/// Statement validators sign to attest a network type section of a block:
/// `[src_network_uid, ntid, height, round, nts_hash]`.
#[derive(Clone, Debug)]
pub struct Decision {
    src_network_uid: Vec<u8>,
    ntid: i64,
    height: i64,
    round: i32,
    nts_hash: Hash,
    bytes: Vec<u8>,
    hash: Hash,
}

impl Decision {
    pub fn new(
        module: &'static dyn Module,
        src_network_uid: &[u8],
        ntid: i64,
        height: i64,
        round: i32,
        nts_hash: &Hash,
    ) -> Result<Self> {
        let mut encoder = Encoder::new();
        encoder.write_list(5)?;
        encoder.write_bytes(src_network_uid)?;
        encoder.write_int(ntid)?;
        encoder.write_int(height)?;
        encoder.write_int(round as i64)?;
        encoder.write_bytes(nts_hash.as_bytes())?;
        let bytes = encoder.into_bytes();
        let hash = module.hash(&bytes);
        Ok(Decision {
            src_network_uid: src_network_uid.to_vec(),
            ntid,
            height,
            round,
            nts_hash: *nts_hash,
            bytes,
            hash,
        })
    }

    pub fn src_network_uid(&self) -> &[u8] {
        &self.src_network_uid
    }

    pub fn ntid(&self) -> i64 {
        self.ntid
    }

    pub fn height(&self) -> i64 {
        self.height
    }

    pub fn round(&self) -> i32 {
        self.round
    }

    pub fn nts_hash(&self) -> &Hash {
        &self.nts_hash
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Hash signed by the validators.
    pub fn hash(&self) -> Hash {
        self.hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ntm::{eth::ETH, icon::ICON};

    const DECISION_HEX: &str = "95c4083078312e69636f6ec40101c4010ac40100c4201111111111111111111111111111111111111111111111111111111111111111";

    fn create_test_decision(module: &'static dyn Module) -> Decision {
        Decision::new(module, b"0x1.icon", 1, 10, 0, &Hash::new([0x11; 32])).unwrap()
    }

    #[test]
    fn decision_bytes() {
        let decision = create_test_decision(&ICON);

        assert_eq!(hex::encode(decision.bytes()), DECISION_HEX);
        assert_eq!(decision.hash(), ICON.hash(decision.bytes()));
    }

    #[test]
    fn decision_hash_depends_on_module() {
        let icon = create_test_decision(&ICON);
        let eth = create_test_decision(&ETH);

        assert_eq!(icon.bytes(), eth.bytes());
        assert_ne!(icon.hash(), eth.hash());
    }

    #[test]
    fn negative_round() {
        let decision = Decision::new(&ETH, b"0x1.eth", 2, 128, -1, &Hash::default()).unwrap();

        assert_eq!(decision.round(), -1);
        assert!(hex::encode(decision.bytes()).contains("c4020080c401ff"));
    }
}

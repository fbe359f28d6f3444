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

//! Signer abstraction used to produce proof parts.
//!
//! A wallet provider resolves a signer either by network type UID or by
//! signature algorithm identifier.

use crate::{crypto::secp256k1, Result};
use std::{collections::HashMap, sync::Arc};

/// Signer bound to a signature algorithm.
pub trait Wallet: Send + Sync {
    /// Public key bytes.
    fn public_key(&self) -> Vec<u8>;

    /// Signature of a 32 bytes hash.
    fn sign(&self, hash: &[u8]) -> Result<Vec<u8>>;
}

/// Wallet lookup by network type UID or DSA identifier.
pub trait WalletProvider {
    fn wallet_for(&self, key: &str) -> Option<Arc<dyn Wallet>>;
}

impl Wallet for secp256k1::KeyPair {
    fn public_key(&self) -> Vec<u8> {
        secp256k1::KeyPair::public_key(self).to_uncompressed()
    }

    fn sign(&self, hash: &[u8]) -> Result<Vec<u8>> {
        secp256k1::KeyPair::sign(self, hash)
    }
}

/// Simple in memory wallet provider.
#[derive(Default, Clone)]
pub struct KeyStore {
    wallets: HashMap<String, Arc<dyn Wallet>>,
}

impl KeyStore {
    pub fn new() -> Self {
        KeyStore::default()
    }

    /// Register `wallet` under `key` (a UID or a DSA identifier).
    pub fn insert(&mut self, key: &str, wallet: Arc<dyn Wallet>) {
        self.wallets.insert(key.to_string(), wallet);
    }
}

impl WalletProvider for KeyStore {
    fn wallet_for(&self, key: &str) -> Option<Arc<dyn Wallet>> {
        self.wallets.get(key).cloned()
    }
}

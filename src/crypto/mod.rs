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

//! Cryptographic primitives used by the network type modules.

pub mod hash;
pub mod merkle;
pub mod secp256k1;
pub mod wallet;

pub use hash::{Hash, HashAlgorithm, HASH_LEN};
pub use merkle::{Dir, MerkleNode};
pub use wallet::{KeyStore, Wallet, WalletProvider};

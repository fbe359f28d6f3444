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

//! Fixed width cryptographic hash.
//!
//! Every network type commits with a 32 bytes hash; the function producing
//! it depends on the type (keccak-256 for Ethereum compatible destinations,
//! sha3-256 for ICON). The digest of a whole block is always sha3-256.

use crate::{Error, ErrorKind, Result};
use serde::{de::Visitor, Deserializer, Serializer};
use sha3::{Digest, Keccak256, Sha3_256};
use std::fmt::{Debug, Display, Formatter};

/// Hash length in bytes.
pub const HASH_LEN: usize = 32;

/// Available hash algorithms.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum HashAlgorithm {
    Sha3_256,
    Keccak256,
}

impl HashAlgorithm {
    /// Compute hash from arbitrary data.
    pub fn digest(&self, data: &[u8]) -> Hash {
        let mut bytes = [0u8; HASH_LEN];
        match self {
            HashAlgorithm::Sha3_256 => bytes.copy_from_slice(&Sha3_256::digest(data)),
            HashAlgorithm::Keccak256 => bytes.copy_from_slice(&Keccak256::digest(data)),
        }
        Hash(bytes)
    }

    /// Hash of the 64 bytes concatenation `left || right`.
    pub fn digest_pair(&self, left: &Hash, right: &Hash) -> Hash {
        let mut buf = [0u8; 2 * HASH_LEN];
        buf[..HASH_LEN].copy_from_slice(&left.0);
        buf[HASH_LEN..].copy_from_slice(&right.0);
        self.digest(&buf)
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
pub struct Hash([u8; HASH_LEN]);

impl Hash {
    /// Wraps precomputed hash bytes.
    pub fn new(bytes: [u8; HASH_LEN]) -> Self {
        Hash(bytes)
    }

    /// Construct from a bytes slice.
    ///
    /// # Errors
    ///
    /// A slice whose length is not `HASH_LEN` gives a `MalformedData` error.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != HASH_LEN {
            return Err(Error::new_ext(
                ErrorKind::MalformedData,
                format!("bad hash length {}", bytes.len()),
            ));
        }
        let mut hash = Hash::default();
        hash.0.copy_from_slice(bytes);
        Ok(hash)
    }

    /// Compute hash from arbitrary data.
    pub fn from_data(alg: HashAlgorithm, data: &[u8]) -> Self {
        alg.digest(data)
    }

    /// Creates a new instance from a hex string.
    /// Mostly used for testing.
    pub fn from_hex(hex: &str) -> Result<Self> {
        match hex::decode(hex) {
            Ok(buf) => Self::from_bytes(&buf),
            Err(err) => Err(Error::new_ext(ErrorKind::MalformedData, err)),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[allow(clippy::wrong_self_convention)]
    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

/// Optional hash as optional bytes slice.
pub(crate) fn opt_bytes(hash: &Option<Hash>) -> Option<&[u8]> {
    hash.as_ref().map(|h| h.as_bytes())
}

/// Optional bytes as optional hash.
pub(crate) fn opt_hash(bytes: Option<Vec<u8>>) -> Result<Option<Hash>> {
    bytes.map(|b| Hash::from_bytes(&b)).transpose()
}

/// Get a reference to the inner bytes array.
impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl Debug for Hash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Hash({})", self.to_hex())
    }
}

impl Display for Hash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl serde::Serialize for Hash {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_bytes(self.as_bytes())
    }
}

impl<'de> serde::Deserialize<'de> for Hash {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct HashVisitor;

        impl<'v> Visitor<'v> for HashVisitor {
            type Value = Hash;

            fn expecting(
                &self,
                fmt: &mut std::fmt::Formatter<'_>,
            ) -> std::result::Result<(), std::fmt::Error> {
                write!(fmt, "expecting byte array.")
            }

            fn visit_bytes<E>(self, bytes: &[u8]) -> std::result::Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Hash::from_bytes(bytes).map_err(|_err| serde::de::Error::custom("Invalid hash"))
            }

            fn visit_byte_buf<E>(self, v: Vec<u8>) -> std::result::Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                self.visit_bytes(&v)
            }
        }
        deserializer.deserialize_byte_buf(HashVisitor)
    }
}

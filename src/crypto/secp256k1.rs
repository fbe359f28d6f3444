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

//! ECDSA over secp256k1 with public key recovery.
//!
//! Signatures are 65 bytes long: `r || s || v` where `v` is the recovery id
//! (0 or 1). Messages are always signed as 32 bytes pre-hashed values.

use crate::{Error, ErrorKind, Result};
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};

/// Recoverable signature length.
pub const SIGNATURE_LEN: usize = 65;

/// Signature algorithm identifier.
pub const DSA: &str = "ecdsa/secp256k1";

pub struct KeyPair {
    imp: SigningKey,
}

impl KeyPair {
    /// Instantiate new keypair given its private scalar bytes.
    pub fn new(private_bytes: &[u8]) -> Result<KeyPair> {
        let imp = SigningKey::from_slice(private_bytes)
            .map_err(|err| Error::new_ext(ErrorKind::MalformedData, err))?;
        Ok(KeyPair { imp })
    }

    /// Recoverable signature of a pre-hashed message.
    pub fn sign(&self, hash: &[u8]) -> Result<Vec<u8>> {
        let (sig, recovery_id) = self
            .imp
            .sign_prehash_recoverable(hash)
            .map_err(|err| Error::new_ext(ErrorKind::Other, err))?;
        let mut buf = sig.to_bytes().to_vec();
        buf.push(recovery_id.to_byte());
        Ok(buf)
    }

    /// Get public key from keypair.
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            imp: *self.imp.verifying_key(),
        }
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &hex::encode(self.public_key().to_uncompressed()))
            .finish()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PublicKey {
    imp: VerifyingKey,
}

impl PublicKey {
    /// Parse a SEC1 encoded key, either compressed (33 bytes) or
    /// uncompressed (65 bytes).
    pub fn from_bytes(bytes: &[u8]) -> Result<PublicKey> {
        let imp = VerifyingKey::from_sec1_bytes(bytes)
            .map_err(|err| Error::new_ext(ErrorKind::MalformedData, err))?;
        Ok(PublicKey { imp })
    }

    /// Recover the signer public key from a 65 bytes recoverable signature.
    pub fn recover(hash: &[u8], sig: &[u8]) -> Result<PublicKey> {
        if sig.len() != SIGNATURE_LEN {
            return Err(Error::new_ext(
                ErrorKind::MalformedData,
                format!("bad signature length {}", sig.len()),
            ));
        }
        let signature = Signature::from_slice(&sig[..SIGNATURE_LEN - 1])
            .map_err(|err| Error::new_ext(ErrorKind::MalformedData, err))?;
        let recovery_id = RecoveryId::from_byte(sig[SIGNATURE_LEN - 1]).ok_or_else(|| {
            Error::new_ext(ErrorKind::MalformedData, "bad signature recovery id")
        })?;
        let imp = VerifyingKey::recover_from_prehash(hash, &signature, recovery_id)
            .map_err(|err| Error::new_ext(ErrorKind::MalformedData, err))?;
        Ok(PublicKey { imp })
    }

    /// Signature verification procedure.
    pub fn verify(&self, hash: &[u8], sig: &[u8]) -> bool {
        PublicKey::recover(hash, sig)
            .map(|key| key == *self)
            .unwrap_or(false)
    }

    /// SEC1 uncompressed encoding (`0x04 || x || y`).
    pub fn to_uncompressed(&self) -> Vec<u8> {
        self.imp.to_encoded_point(false).as_bytes().to_vec()
    }

    /// SEC1 compressed encoding.
    pub fn to_compressed(&self) -> Vec<u8> {
        self.imp.to_encoded_point(true).as_bytes().to_vec()
    }
}

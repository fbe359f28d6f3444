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

//! MessagePack one-shot marshalling of serde types.
//!
//! Structures are serialized without field names (as lists), so a struct
//! whose integer fields use the [`int64`] adapter and whose byte fields use
//! `serde_bytes` is encoded exactly like the equivalent list written with the
//! streaming [`Encoder`](crate::base::codec::Encoder).

use crate::{Error, ErrorKind, Result};
use serde::{Deserialize, Serialize};

/// Serialize using MessagePack format (without field names).
///
/// # Error
///
/// If the data cannot be serialized a `MalformedData` error kind is returned.
pub fn rmp_serialize<T>(val: &T) -> Result<Vec<u8>>
where
    T: Serialize,
{
    rmp_serde::to_vec(val).map_err(|err| Error::new_ext(ErrorKind::MalformedData, err))
}

/// Deserialize using MessagePack format.
///
/// # Error
///
/// If the data cannot be deserialized a `MalformedData` error kind is returned.
pub fn rmp_deserialize<'a, T>(buf: &'a [u8]) -> Result<T>
where
    T: Deserialize<'a>,
{
    rmp_serde::from_slice(buf).map_err(|err| Error::new_ext(ErrorKind::MalformedData, err))
}

/// One-shot MessagePack marshalling, used for the records the host persists.
pub trait MessagePack<'a>: Sized + Serialize + Deserialize<'a> {
    fn serialize(&self) -> Result<Vec<u8>> {
        rmp_serialize(self)
    }

    fn deserialize(buf: &'a [u8]) -> Result<Self> {
        rmp_deserialize(buf)
    }
}

impl<'a, T: Serialize + Deserialize<'a>> MessagePack<'a> for T {}

/// Serde adapter encoding an `i64` as the codec integer representation
/// (minimal two's complement bytes).
pub mod int64 {
    use crate::base::codec::{bytes_to_int, int_to_bytes};
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_bytes::ByteBuf;

    pub fn serialize<S>(value: &i64, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_bytes(&int_to_bytes(*value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
    where
        D: Deserializer<'de>,
    {
        let buf = ByteBuf::deserialize(deserializer)?;
        bytes_to_int(&buf).map_err(|err| serde::de::Error::custom(err.to_string_full()))
    }
}

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

//! Library error codes and results.

use std::fmt::{Display, Formatter};

/// Project-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Max string length when the error is converted to string using `to_string_full`.
const MAX_ERROR_SOURCE_STRING_LENGTH: usize = 128;

/// Error kind to better contextualize the returned error.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ErrorKind {
    MalformedData,
    InvalidIndex,
    NetworkNotFound,
    NetworkClosed,
    NetworkTypeNotFound,
    NetworkTypeNotInDigest,
    ModuleNotFound,
    MessageNotFound,
    ResourceNotFound,
    InvalidProofPart,
    DuplicateIndex,
    InsufficientSignatures,
    NotAValidator,
    ProofCountMismatch,
    ProofDecodeError,
    BuilderFinalized,
    IllegalState,
    DatabaseFault,
    Other,
}

/// Coarse error classification, useful to callers deciding whether to retry
/// a block or reject its input.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ErrorClass {
    NotFound,
    InvalidInput,
    InvalidProof,
    IllegalState,
    Storage,
    Other,
}

/// Error kind strings.
pub(super) mod error_kind_str {
    pub const MALFORMED_DATA: &str = "malformed data";
    pub const INVALID_INDEX: &str = "invalid index";
    pub const NETWORK_NOT_FOUND: &str = "network not found";
    pub const NETWORK_CLOSED: &str = "network closed";
    pub const NETWORK_TYPE_NOT_FOUND: &str = "network type not found";
    pub const NETWORK_TYPE_NOT_IN_DIGEST: &str = "network type not in digest";
    pub const MODULE_NOT_FOUND: &str = "network type module not found";
    pub const MESSAGE_NOT_FOUND: &str = "message not found";
    pub const RESOURCE_NOT_FOUND: &str = "resource not found";
    pub const INVALID_PROOF_PART: &str = "invalid proof part";
    pub const DUPLICATE_INDEX: &str = "duplicate index";
    pub const INSUFFICIENT_SIGNATURES: &str = "insufficient signatures";
    pub const NOT_A_VALIDATOR: &str = "not a validator";
    pub const PROOF_COUNT_MISMATCH: &str = "proof count mismatch";
    pub const PROOF_DECODE_ERROR: &str = "proof decode error";
    pub const BUILDER_FINALIZED: &str = "builder finalized";
    pub const ILLEGAL_STATE: &str = "illegal state";
    pub const DATABASE_FAULT: &str = "database fault";
    pub const OTHER: &str = "other";
}

impl ErrorKind {
    /// Class of the error kind.
    pub fn class(&self) -> ErrorClass {
        use ErrorKind::*;
        match self {
            NetworkNotFound | NetworkTypeNotFound | NetworkTypeNotInDigest | ModuleNotFound
            | MessageNotFound | ResourceNotFound => ErrorClass::NotFound,
            MalformedData | InvalidIndex | NetworkClosed => ErrorClass::InvalidInput,
            InvalidProofPart | DuplicateIndex | InsufficientSignatures | NotAValidator
            | ProofCountMismatch | ProofDecodeError => ErrorClass::InvalidProof,
            BuilderFinalized | IllegalState => ErrorClass::IllegalState,
            DatabaseFault => ErrorClass::Storage,
            Other => ErrorClass::Other,
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        use ErrorKind::*;
        let kind_str = match self {
            MalformedData => error_kind_str::MALFORMED_DATA,
            InvalidIndex => error_kind_str::INVALID_INDEX,
            NetworkNotFound => error_kind_str::NETWORK_NOT_FOUND,
            NetworkClosed => error_kind_str::NETWORK_CLOSED,
            NetworkTypeNotFound => error_kind_str::NETWORK_TYPE_NOT_FOUND,
            NetworkTypeNotInDigest => error_kind_str::NETWORK_TYPE_NOT_IN_DIGEST,
            ModuleNotFound => error_kind_str::MODULE_NOT_FOUND,
            MessageNotFound => error_kind_str::MESSAGE_NOT_FOUND,
            ResourceNotFound => error_kind_str::RESOURCE_NOT_FOUND,
            InvalidProofPart => error_kind_str::INVALID_PROOF_PART,
            DuplicateIndex => error_kind_str::DUPLICATE_INDEX,
            InsufficientSignatures => error_kind_str::INSUFFICIENT_SIGNATURES,
            NotAValidator => error_kind_str::NOT_A_VALIDATOR,
            ProofCountMismatch => error_kind_str::PROOF_COUNT_MISMATCH,
            ProofDecodeError => error_kind_str::PROOF_DECODE_ERROR,
            BuilderFinalized => error_kind_str::BUILDER_FINALIZED,
            IllegalState => error_kind_str::ILLEGAL_STATE,
            DatabaseFault => error_kind_str::DATABASE_FAULT,
            Other => error_kind_str::OTHER,
        };
        write!(f, "{}", kind_str)
    }
}

/// Project-wide error type.
/// Contains a kind enumerate and a `source` to identify the subsystem that may
/// have propagated the error.
#[derive(Debug)]
pub struct Error {
    /// Error kind.
    pub kind: ErrorKind,
    /// Underlying cause, if any.
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl Clone for Error {
    fn clone(&self) -> Self {
        Error {
            kind: self.kind,
            source: None,
        }
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error::new(kind)
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::new_ext(ErrorKind::Other, s)
    }
}

impl Error {
    pub fn new_ext<E>(kind: ErrorKind, error: E) -> Error
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let source = error.into();
        Error {
            kind,
            source: Some(source),
        }
    }

    pub fn new(kind: ErrorKind) -> Error {
        Error { kind, source: None }
    }

    /// Error class shortcut.
    pub fn class(&self) -> ErrorClass {
        self.kind.class()
    }

    pub fn to_string_full(&self) -> String {
        let mut err_string = self.to_string();
        if let Some(ref source) = self.source {
            let detail = format!(": {}", source);
            let mut max_len = std::cmp::min(detail.len(), MAX_ERROR_SOURCE_STRING_LENGTH);
            while !detail.is_char_boundary(max_len) {
                max_len -= 1;
            }
            err_string.push_str(&detail[..max_len]);
        }
        err_string
    }
}

impl PartialEq for Error {
    fn eq(&self, other: &Error) -> bool {
        if self.kind != other.kind {
            return false;
        }
        if self.source.is_none() && other.source.is_none() {
            true
        } else if self.source.is_some() && other.source.is_some() {
            format!("{:?}", self.source) == format!("{:?}", other.source)
        } else {
            false
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self.source {
            None => None,
            Some(ref source) => Some(source.as_ref()),
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind)
    }
}

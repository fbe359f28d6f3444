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

//! Blockchain Transfer Protocol sections.
//!
//! While a block is executed the [`SectionBuilder`] collects the messages
//! sent to the linked networks and produces the block [`Section`]. Its
//! [`Digest`] is embedded in the block and flushed to storage together with
//! the messages. Validators sign a [`Decision`](crate::ntm::Decision) for
//! every network type section, and the [`ProofContextMap`] verifies those
//! signatures and follows the validator set changes block after block.

use crate::db::Db;
use std::sync::Arc;

pub mod builder;
pub mod digest;
pub mod from_digest;
pub mod message;
pub mod proof_context_map;
pub mod resolver;
pub mod section;
pub mod state;

pub use builder::{SectionBuilder, Transaction};
pub use digest::{Digest, NetworkDigest, NetworkTypeDigest};
pub use from_digest::SectionFromDigest;
pub use message::{Message, MessageList};
pub use proof_context_map::{ProofContextMap, ProofContextUpdate, UpdateSource};
pub use section::{BuiltSection, NetworkSection, NetworkTypeSection, Section};
pub use state::{NetworkTypeView, NetworkView, StateView};

/// Section of an already executed block, rebuilt from its digest.
/// `view` is the state after the block execution.
pub fn new_section(digest: Arc<Digest>, view: Arc<dyn StateView>, db: Arc<dyn Db>) -> Section {
    Section::FromDigest(SectionFromDigest::new(digest, view, db))
}

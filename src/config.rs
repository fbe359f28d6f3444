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

//! Engine configuration.

/// BTP configuration of the local chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BtpConfig {
    /// Local network identifier.
    pub network_id: u64,
    /// Platform name, e.g. `"icon"`.
    pub platform: String,
}

impl Default for BtpConfig {
    fn default() -> Self {
        BtpConfig {
            network_id: 1,
            platform: "trinci".to_string(),
        }
    }
}

impl BtpConfig {
    /// Source network UID used in decisions: `0x<hex network id>.<platform>`.
    pub fn src_network_uid(&self) -> String {
        format!("{:#x}.{}", self.network_id, self.platform)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::serialize::MessagePack;

    #[test]
    fn src_network_uid() {
        let config = BtpConfig {
            network_id: 0x1a2,
            platform: "icon".to_string(),
        };

        assert_eq!(config.src_network_uid(), "0x1a2.icon");
        assert_eq!(BtpConfig::default().src_network_uid(), "0x1.trinci");
    }

    #[test]
    fn config_persistence() {
        let config = BtpConfig::default();

        let buf = config.serialize().unwrap();

        assert_eq!(BtpConfig::deserialize(&buf).unwrap(), config);
    }
}

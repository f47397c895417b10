//! # Core Type Definitions
//!
//! Identifiers and small enums shared by the attribute store and the
//! database layer.
//!
//! - [`SteamId`] - stable 64-bit account identifier naming one tracked player
//! - [`Partition`] - which half of a player's data a namespace map belongs to

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for a tracked player.
///
/// Wraps the 64-bit SteamID so it cannot be confused with other numeric ids.
/// The database stores it as a signed `BIGINT`; every SteamID64 in use fits
/// below `i64::MAX`.
///
/// # Examples
///
/// ```rust
/// use zenith_core::SteamId;
///
/// let id: SteamId = "76561198012345678".parse().unwrap();
/// assert_eq!(id.as_u64(), 76561198012345678);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SteamId(pub u64);

impl SteamId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Column representation used in SQL binds.
    pub(crate) fn as_db(self) -> i64 {
        self.0 as i64
    }
}

impl From<u64> for SteamId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::str::FromStr for SteamId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u64>().map(Self)
    }
}

impl fmt::Display for SteamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Partitions
// ============================================================================

/// One of the two halves of a player's namespaced data.
///
/// `Settings` holds user-facing preferences, `Storage` holds accumulated state
/// written by module logic. Each partition lives in its own table with one
/// JSON text column per namespace (`"<namespace>.settings"` / `"<namespace>.storage"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Partition {
    Settings,
    Storage,
}

impl Partition {
    pub const ALL: [Partition; 2] = [Partition::Settings, Partition::Storage];

    /// Column suffix and table suffix for this partition.
    pub fn suffix(self) -> &'static str {
        match self {
            Partition::Settings => "settings",
            Partition::Storage => "storage",
        }
    }

    /// Column holding a namespace's data in this partition's table.
    pub fn column_for(self, namespace: &str) -> String {
        format!("{}.{}", namespace, self.suffix())
    }

    /// Extracts the namespace from a data column name, if the column belongs
    /// to this partition.
    pub fn namespace_of(self, column: &str) -> Option<&str> {
        column
            .strip_suffix(self.suffix())
            .and_then(|rest| rest.strip_suffix('.'))
            .filter(|ns| !ns.is_empty())
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steam_id_parse_and_display() {
        let id: SteamId = "76561198012345678".parse().unwrap();
        assert_eq!(id, SteamId(76561198012345678));
        assert_eq!(id.to_string(), "76561198012345678");
        assert_eq!(id.as_db(), 76561198012345678i64);
        assert!("not-a-number".parse::<SteamId>().is_err());
    }

    #[test]
    fn test_partition_columns() {
        assert_eq!(Partition::Settings.column_for("ranks"), "ranks.settings");
        assert_eq!(Partition::Storage.column_for("ranks"), "ranks.storage");
        assert_eq!(Partition::Storage.namespace_of("ranks.storage"), Some("ranks"));
        assert_eq!(Partition::Storage.namespace_of("ranks.settings"), None);
        assert_eq!(Partition::Settings.namespace_of(".settings"), None);
        assert_eq!(Partition::Settings.namespace_of("name"), None);
        assert_eq!(
            Partition::Settings.namespace_of("k4.zenith.settings"),
            Some("k4.zenith")
        );
    }
}

//! Core types used throughout the ring tree crate.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Node identifier in the topology.
pub type NodeId = String;

/// Position in the 64-bit ring identifier space.
pub type RingCoordinate = u64;

/// Which owners of a region a query is interested in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OwnerQueryMode {
    /// Primary owners only.
    Primary,
    /// Secondary owners only.
    Secondary,
    /// Primary owners followed by secondary owners.
    All,
}

impl OwnerQueryMode {
    /// Whether primary owners are part of the answer.
    pub fn includes_primary(&self) -> bool {
        matches!(self, OwnerQueryMode::Primary | OwnerQueryMode::All)
    }

    /// Whether secondary owners are part of the answer.
    pub fn includes_secondary(&self) -> bool {
        matches!(self, OwnerQueryMode::Secondary | OwnerQueryMode::All)
    }
}

impl std::fmt::Display for OwnerQueryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OwnerQueryMode::Primary => write!(f, "primary"),
            OwnerQueryMode::Secondary => write!(f, "secondary"),
            OwnerQueryMode::All => write!(f, "all"),
        }
    }
}

/// Milliseconds since the unix epoch.
pub fn current_time_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_query_mode_inclusion() {
        assert!(OwnerQueryMode::Primary.includes_primary());
        assert!(!OwnerQueryMode::Primary.includes_secondary());
        assert!(!OwnerQueryMode::Secondary.includes_primary());
        assert!(OwnerQueryMode::Secondary.includes_secondary());
        assert!(OwnerQueryMode::All.includes_primary());
        assert!(OwnerQueryMode::All.includes_secondary());
    }

    #[test]
    fn test_current_time_millis_advances() {
        let a = current_time_millis();
        let b = current_time_millis();
        assert!(b >= a);
        assert!(a > 0);
    }
}

//! Convergence phases of one participant for one ring version.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Phase of a ring convergence, in protocol order.
///
/// ```text
/// INITIAL ─► READY_1 ─► READY_2 ─► LOCAL_COMPLETE_1 ─► ALL_COMPLETE_1 ─► ALL_COMPLETE_2 ─► CLOSED
///    │          │          │              │                  │                 │
///    └──────────┴──────────┴──────────────┴──────────────────┴─────────────────┴──► ABANDONED
/// ```
///
/// `INITIAL` may also jump straight to any later state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RingState {
    Initial,
    #[serde(rename = "READY_FOR_CONVERGENCE_1")]
    ReadyForConvergence1,
    #[serde(rename = "READY_FOR_CONVERGENCE_2")]
    ReadyForConvergence2,
    #[serde(rename = "LOCAL_CONVERGENCE_COMPLETE_1")]
    LocalConvergenceComplete1,
    #[serde(rename = "ALL_CONVERGENCE_COMPLETE_1")]
    AllConvergenceComplete1,
    #[serde(rename = "ALL_CONVERGENCE_COMPLETE_2")]
    AllConvergenceComplete2,
    Closed,
    Abandoned,
}

impl RingState {
    /// Every state, in protocol order.
    pub const ALL: [RingState; 8] = [
        RingState::Initial,
        RingState::ReadyForConvergence1,
        RingState::ReadyForConvergence2,
        RingState::LocalConvergenceComplete1,
        RingState::AllConvergenceComplete1,
        RingState::AllConvergenceComplete2,
        RingState::Closed,
        RingState::Abandoned,
    ];

    /// The one forward step allowed from this state.
    pub fn successor(&self) -> Option<RingState> {
        match self {
            RingState::Initial => Some(RingState::ReadyForConvergence1),
            RingState::ReadyForConvergence1 => Some(RingState::ReadyForConvergence2),
            RingState::ReadyForConvergence2 => Some(RingState::LocalConvergenceComplete1),
            RingState::LocalConvergenceComplete1 => Some(RingState::AllConvergenceComplete1),
            RingState::AllConvergenceComplete1 => Some(RingState::AllConvergenceComplete2),
            RingState::AllConvergenceComplete2 => Some(RingState::Closed),
            RingState::Closed | RingState::Abandoned => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RingState::Closed | RingState::Abandoned)
    }

    /// A participant in this state keeps answering queries but initiates nothing.
    pub fn requires_passive_participation(&self) -> bool {
        matches!(self, RingState::Closed)
    }

    /// Whether `self -> to` is a legal transition.
    pub fn is_valid_transition(&self, to: RingState) -> bool {
        match self {
            RingState::Closed | RingState::Abandoned => false,
            RingState::Initial => to != RingState::Initial,
            _ => to == RingState::Abandoned || self.successor() == Some(to),
        }
    }

    /// Validate `self -> to`.
    pub fn check_transition(&self, to: RingState) -> Result<()> {
        if self.is_valid_transition(to) {
            Ok(())
        } else {
            Err(Error::InvalidRingTransition { from: *self, to })
        }
    }

    /// Whether a participant observed at `observed` satisfies a requirement
    /// of `self`: it is at `self` or further along the successor chain.
    ///
    /// `ABANDONED` meets only itself.
    pub fn met_by(&self, observed: RingState) -> bool {
        let mut state = Some(*self);
        while let Some(current) = state {
            if current == observed {
                return true;
            }
            state = current.successor();
        }
        false
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RingState::Initial => "INITIAL",
            RingState::ReadyForConvergence1 => "READY_FOR_CONVERGENCE_1",
            RingState::ReadyForConvergence2 => "READY_FOR_CONVERGENCE_2",
            RingState::LocalConvergenceComplete1 => "LOCAL_CONVERGENCE_COMPLETE_1",
            RingState::AllConvergenceComplete1 => "ALL_CONVERGENCE_COMPLETE_1",
            RingState::AllConvergenceComplete2 => "ALL_CONVERGENCE_COMPLETE_2",
            RingState::Closed => "CLOSED",
            RingState::Abandoned => "ABANDONED",
        }
    }

    /// Wire form: the state's name.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.as_str().as_bytes().to_vec()
    }

    /// Decode the wire form. Empty input is `None`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Option<RingState>> {
        if bytes.is_empty() {
            return Ok(None);
        }
        let name = std::str::from_utf8(bytes).map_err(|e| Error::Parse {
            source_name: "ring state".to_string(),
            reason: e.to_string(),
        })?;
        name.parse().map(Some)
    }
}

impl std::fmt::Display for RingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RingState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        RingState::ALL
            .iter()
            .find(|state| state.as_str() == s)
            .copied()
            .ok_or_else(|| Error::Parse {
                source_name: "ring state".to_string(),
                reason: format!("unknown ring state: {:?}", s),
            })
    }
}

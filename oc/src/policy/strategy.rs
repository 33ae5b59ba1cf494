//! Resolution strategies and conflict descriptors

use serde::{Deserialize, Serialize};

use crate::domain::{OperationId, OperationKind};

/// How a conflict between an existing and a proposed operation is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionStrategy {
    /// Store the new operation as pending; start it once the conflict clears
    Queue,
    /// Reject the new operation; nothing is stored
    Cancel,
    /// Cancel the existing operation and start the new one
    Replace,
    /// The pair is compatible; start the new operation
    Allow,
}

impl ResolutionStrategy {
    /// Rank used when several conflicts apply at once (higher wins)
    ///
    /// `cancel > queue > replace > allow`
    pub fn restrictiveness(&self) -> u8 {
        match self {
            Self::Cancel => 3,
            Self::Queue => 2,
            Self::Replace => 1,
            Self::Allow => 0,
        }
    }

    /// Whether a conflict with this strategy prevents a pending operation from starting
    pub fn blocks_start(&self) -> bool {
        !matches!(self, Self::Allow)
    }
}

impl std::fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Queue => write!(f, "queue"),
            Self::Cancel => write!(f, "cancel"),
            Self::Replace => write!(f, "replace"),
            Self::Allow => write!(f, "allow"),
        }
    }
}

impl std::str::FromStr for ResolutionStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "queue" => Ok(Self::Queue),
            "cancel" => Ok(Self::Cancel),
            "replace" => Ok(Self::Replace),
            "allow" => Ok(Self::Allow),
            _ => Err(format!("Unknown resolution strategy: {}", s)),
        }
    }
}

/// A conflict found for one admission decision; never stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationConflict {
    /// The already-active operation the proposal collides with
    pub existing_id: OperationId,
    pub existing_kind: OperationKind,
    pub strategy: ResolutionStrategy,
}

/// Pick the governing strategy among several conflicts
///
/// Returns `None` when there are no conflicts.
pub fn strongest(conflicts: &[OperationConflict]) -> Option<ResolutionStrategy> {
    conflicts
        .iter()
        .map(|c| c.strategy)
        .max_by_key(|s| s.restrictiveness())
}

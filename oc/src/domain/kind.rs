//! Operation kinds
//!
//! An `OperationKind` names both what is being done (its category and any
//! category-specific payload) and which memo it is done to.

use serde::{Deserialize, Serialize};

use super::id::MemoId;
use super::priority::Priority;

/// Kind of analysis run over a transcript
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisMode {
    Summary,
    Themes,
    Todos,
    Sentiment,
    Questions,
}

impl std::fmt::Display for AnalysisMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Summary => write!(f, "summary"),
            Self::Themes => write!(f, "themes"),
            Self::Todos => write!(f, "todos"),
            Self::Sentiment => write!(f, "sentiment"),
            Self::Questions => write!(f, "questions"),
        }
    }
}

impl std::str::FromStr for AnalysisMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "summary" => Ok(Self::Summary),
            "themes" => Ok(Self::Themes),
            "todos" => Ok(Self::Todos),
            "sentiment" => Ok(Self::Sentiment),
            "questions" => Ok(Self::Questions),
            _ => Err(format!("Unknown analysis mode: {}", s)),
        }
    }
}

/// Category of an operation, independent of the memo it targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationCategory {
    Recording,
    Transcription,
    Analysis,
}

impl OperationCategory {
    pub const ALL: [OperationCategory; 3] = [Self::Recording, Self::Transcription, Self::Analysis];
}

impl std::fmt::Display for OperationCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Recording => write!(f, "recording"),
            Self::Transcription => write!(f, "transcription"),
            Self::Analysis => write!(f, "analysis"),
        }
    }
}

impl std::str::FromStr for OperationCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "recording" => Ok(Self::Recording),
            "transcription" => Ok(Self::Transcription),
            "analysis" => Ok(Self::Analysis),
            _ => Err(format!("Unknown operation category: {}", s)),
        }
    }
}

/// What an operation does and to which memo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "lowercase")]
pub enum OperationKind {
    /// Capturing audio into the memo
    Recording { memo_id: MemoId },
    /// Turning the memo's audio into text
    Transcription { memo_id: MemoId },
    /// Running one AI analysis over the memo's transcript
    Analysis { memo_id: MemoId, mode: AnalysisMode },
}

impl OperationKind {
    pub fn recording(memo_id: MemoId) -> Self {
        Self::Recording { memo_id }
    }

    pub fn transcription(memo_id: MemoId) -> Self {
        Self::Transcription { memo_id }
    }

    pub fn analysis(memo_id: MemoId, mode: AnalysisMode) -> Self {
        Self::Analysis { memo_id, mode }
    }

    /// The memo this operation targets
    pub fn memo_id(&self) -> MemoId {
        match self {
            Self::Recording { memo_id } | Self::Transcription { memo_id } | Self::Analysis { memo_id, .. } => *memo_id,
        }
    }

    pub fn category(&self) -> OperationCategory {
        match self {
            Self::Recording { .. } => OperationCategory::Recording,
            Self::Transcription { .. } => OperationCategory::Transcription,
            Self::Analysis { .. } => OperationCategory::Analysis,
        }
    }

    /// Analysis mode, if this is an analysis
    pub fn analysis_mode(&self) -> Option<AnalysisMode> {
        match self {
            Self::Analysis { mode, .. } => Some(*mode),
            _ => None,
        }
    }

    /// Human-readable description for logs and observers
    pub fn description(&self) -> String {
        match self {
            Self::Recording { memo_id } => format!("Recording memo {}", memo_id),
            Self::Transcription { memo_id } => format!("Transcribing memo {}", memo_id),
            Self::Analysis { memo_id, mode } => format!("Analyzing memo {} ({})", memo_id, mode),
        }
    }

    /// Priority used when the caller does not pick one
    ///
    /// Recording is latency sensitive (the user is waiting on the mic), analysis
    /// is the most deferrable.
    pub fn default_priority(&self) -> Priority {
        match self {
            Self::Recording { .. } => Priority::High,
            Self::Transcription { .. } => Priority::Medium,
            Self::Analysis { .. } => Priority::Low,
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Analysis { mode, .. } => write!(f, "analysis:{}", mode),
            other => write!(f, "{}", other.category()),
        }
    }
}

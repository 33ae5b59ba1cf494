//! Priority levels for queued operations

use serde::{Deserialize, Serialize};

/// Priority of an operation, fixed at registration
///
/// Ordering is `Low < Medium < High`, so sorting descending puts the most
/// urgent work first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Self::High, Self::Medium, Self::Low];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown priority: {} (expected high, medium or low)", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_high_sorts_first_descending() {
        let mut priorities = vec![Priority::Medium, Priority::Low, Priority::High];
        priorities.sort_by(|a, b| b.cmp(a));
        assert_eq!(priorities, Priority::ALL.to_vec());
    }

    #[test]
    fn test_priority_text_forms() {
        assert_eq!("HIGH".parse::<Priority>().unwrap(), Priority::High);
        assert!("urgent".parse::<Priority>().is_err());
        for priority in Priority::ALL {
            assert_eq!(priority.to_string().parse::<Priority>().unwrap(), priority);
        }
        assert_eq!(serde_json::to_string(&Priority::Low).unwrap(), "\"low\"");
    }
}

//! Reaction kind - the fixed set of emoji reactions a story can receive

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the fixed reaction kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactionKind {
    Heart,
    Fire,
    Laugh,
    Wow,
    Sad,
}

impl ReactionKind {
    /// Every kind, in display order
    pub const ALL: [ReactionKind; 5] = [
        ReactionKind::Heart,
        ReactionKind::Fire,
        ReactionKind::Laugh,
        ReactionKind::Wow,
        ReactionKind::Sad,
    ];

    /// Wire name of the kind
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Heart => "heart",
            Self::Fire => "fire",
            Self::Laugh => "laugh",
            Self::Wow => "wow",
            Self::Sad => "sad",
        }
    }

    /// Emoji shown for the kind
    #[must_use]
    pub const fn emoji(&self) -> &'static str {
        match self {
            Self::Heart => "❤️",
            Self::Fire => "🔥",
            Self::Laugh => "😂",
            Self::Wow => "😮",
            Self::Sad => "😢",
        }
    }

    /// Position in [`ReactionKind::ALL`]
    #[must_use]
    pub fn ordinal(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for ReactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error when parsing a reaction kind from string
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid reaction kind: {0}")]
pub struct ReactionKindParseError(pub String);

impl std::str::FromStr for ReactionKind {
    type Err = ReactionKindParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "heart" => Ok(Self::Heart),
            "fire" => Ok(Self::Fire),
            "laugh" => Ok(Self::Laugh),
            "wow" => Ok(Self::Wow),
            "sad" => Ok(Self::Sad),
            _ => Err(ReactionKindParseError(s.to_string())),
        }
    }
}

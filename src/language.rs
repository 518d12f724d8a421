use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ParrotError, Result};

/// Languages the service translates between
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Korean,
    Japanese,
    English,
}

impl Language {
    pub const ALL: [Language; 3] = [Language::Korean, Language::Japanese, Language::English];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Korean => "korean",
            Self::Japanese => "japanese",
            Self::English => "english",
        }
    }

    /// Two-letter code used in direction and domain tags
    pub fn short_code(&self) -> &'static str {
        match self {
            Self::Korean => "ko",
            Self::Japanese => "ja",
            Self::English => "en",
        }
    }

    /// Parse a caller-supplied language, failing with a `Language` error
    pub fn parse(value: &str, role: &str) -> Result<Self> {
        value.parse::<Language>().map_err(|_| {
            ParrotError::Language(format!("Unsupported {} language: {}", role, value))
        })
    }

    fn from_short_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|lang| lang.short_code() == code)
    }
}

impl FromStr for Language {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "korean" | "ko" => Ok(Self::Korean),
            "japanese" | "ja" => Ok(Self::Japanese),
            "english" | "en" => Ok(Self::English),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A source/target pair, written as `ko2ja`, `ja2ko`, ...
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Direction {
    pub source: Language,
    pub target: Language,
}

impl Direction {
    pub const KOREAN_TO_JAPANESE: Direction = Direction {
        source: Language::Korean,
        target: Language::Japanese,
    };

    pub const JAPANESE_TO_KOREAN: Direction = Direction {
        source: Language::Japanese,
        target: Language::Korean,
    };

    pub fn new(source: Language, target: Language) -> Self {
        Self { source, target }
    }

    pub fn tag(&self) -> String {
        format!("{}2{}", self.source.short_code(), self.target.short_code())
    }

    /// Every cross-language pair
    pub fn all() -> Vec<Direction> {
        let mut directions = Vec::new();
        for source in Language::ALL {
            for target in Language::ALL {
                if source != target {
                    directions.push(Direction::new(source, target));
                }
            }
        }
        directions
    }

    /// Human readable label, e.g. "korean → japanese"
    pub fn label(&self) -> String {
        format!("{} → {}", self.source, self.target)
    }
}

impl FromStr for Direction {
    type Err = ParrotError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || {
            ParrotError::InvalidRequest(format!(
                "Invalid direction '{}'. Expected a tag such as ko2ja or ja2ko",
                s
            ))
        };

        let lowered = s.trim().to_lowercase();
        let (source, target) = lowered.split_once('2').ok_or_else(invalid)?;

        let source = Language::from_short_code(source).ok_or_else(invalid)?;
        let target = Language::from_short_code(target).ok_or_else(invalid)?;
        Ok(Direction::new(source, target))
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tag())
    }
}

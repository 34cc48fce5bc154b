use std::fmt;

use serde::{Deserialize, Serialize};

// ── Pad identity ──────────────────────────────────────────────────────────────

/// Stable identifier of a pad, unique within a kit.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PadId(String);

impl PadId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PadId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for PadId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ── Category ──────────────────────────────────────────────────────────────────

/// Sound family of a pad.  Only used to pick a synthesis recipe when no real
/// sample is available.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PadCategory {
    Kick,
    Snare,
    #[serde(alias = "hi-hat", alias = "closedhat")]
    HiHat,
    #[serde(alias = "openhat")]
    OpenHat,
    Clap,
    Tom,
    Crash,
    Percussion,
    Effect,
}

impl PadCategory {
    pub const ALL: [PadCategory; 9] = [
        PadCategory::Kick,
        PadCategory::Snare,
        PadCategory::HiHat,
        PadCategory::OpenHat,
        PadCategory::Clap,
        PadCategory::Tom,
        PadCategory::Crash,
        PadCategory::Percussion,
        PadCategory::Effect,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Kick       => "Kick",
            Self::Snare      => "Snare",
            Self::HiHat      => "C-Hat",
            Self::OpenHat    => "O-Hat",
            Self::Clap       => "Clap",
            Self::Tom        => "Tom",
            Self::Crash      => "Crash",
            Self::Percussion => "Perc",
            Self::Effect     => "FX",
        }
    }
}

// ── Source reference ──────────────────────────────────────────────────────────

const SYNTHESIZE: &str = "synthesize";

/// Where a pad's audio comes from: a real asset, or the built-in synthesiser.
///
/// Serialised as a plain string; `"synthesize"` (or an empty string) is the
/// sentinel, anything else is treated as a path or `file://` URL.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SourceRef {
    #[default]
    Synthesize,
    Url(String),
}

impl From<String> for SourceRef {
    fn from(s: String) -> Self {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(SYNTHESIZE) {
            SourceRef::Synthesize
        } else {
            SourceRef::Url(trimmed.to_string())
        }
    }
}

impl From<SourceRef> for String {
    fn from(src: SourceRef) -> Self {
        match src {
            SourceRef::Synthesize => SYNTHESIZE.to_string(),
            SourceRef::Url(url)   => url,
        }
    }
}

// ── Pad ───────────────────────────────────────────────────────────────────────

/// One triggerable sound slot of a kit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pad {
    pub id: PadId,
    pub category: PadCategory,
    #[serde(default)]
    pub source_ref: SourceRef,
}

impl Pad {
    pub fn synthesized(id: impl Into<PadId>, category: PadCategory) -> Self {
        Self { id: id.into(), category, source_ref: SourceRef::Synthesize }
    }

    pub fn from_url(id: impl Into<PadId>, category: PadCategory, url: impl Into<String>) -> Self {
        Self { id: id.into(), category, source_ref: SourceRef::Url(url.into()) }
    }
}

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Logical UI targets the harvester interacts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    Risk,
    Time,
    Download,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Target::Risk => "risk",
            Target::Time => "time",
            Target::Download => "download",
        };
        f.write_str(name)
    }
}

/// How to find one logical target on a page whose markup is not stable.
///
/// `structural_candidates` are CSS selectors tried in order. `text_aliases`
/// are free-text labels (any language, matched case-insensitively) that name
/// the target itself, e.g. the caption of a custom dropdown or the text of a
/// download button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorSpec {
    pub target: Target,
    #[serde(default)]
    pub structural_candidates: Vec<String>,
    #[serde(default)]
    pub text_aliases: Vec<String>,
}

impl SelectorSpec {
    pub fn new(
        target: Target,
        structural_candidates: impl IntoIterator<Item = impl Into<String>>,
        text_aliases: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            target,
            structural_candidates: structural_candidates.into_iter().map(Into::into).collect(),
            text_aliases: text_aliases.into_iter().map(Into::into).collect(),
        }
    }
}

/// Immutable lookup from target to its selector spec. Built once at startup.
#[derive(Debug, Clone, Default)]
pub struct SelectorRegistry {
    specs: HashMap<Target, SelectorSpec>,
}

impl SelectorRegistry {
    /// Later specs for the same target replace earlier ones.
    pub fn new(specs: impl IntoIterator<Item = SelectorSpec>) -> Self {
        let specs = specs.into_iter().map(|s| (s.target, s)).collect();
        Self { specs }
    }

    pub fn get(&self, target: Target) -> Option<&SelectorSpec> {
        self.specs.get(&target)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

/// Compare two visible labels ignoring surrounding whitespace and case,
/// including non-ASCII letters (`SESIÓN` matches `sesión`).
pub fn same_label(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

static HOUR_MINUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{1,2})\D?(\d{2})").expect("static time-slot pattern")
});

/// Canonical `HHMM` intraday slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimeSlot(String);

impl TimeSlot {
    /// Normalize raw input like `"9:40"`, `"09:40"` or `"0940"` to `"0940"`.
    ///
    /// Input without a recognizable hour/minute pair is left-padded to four
    /// characters and kept as-is otherwise.
    pub fn parse(raw: &str) -> Self {
        let compact = raw.trim().replace(':', "");
        match HOUR_MINUTE.captures(&compact) {
            Some(caps) => Self(format!("{:0>2}{}", &caps[1], &caps[2])),
            None => Self(format!("{:0>4}", compact)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `HH:MM` form, as the site usually renders it in option labels.
    pub fn display_label(&self) -> String {
        if self.0.len() == 4 && self.0.is_ascii() {
            format!("{}:{}", &self.0[..2], &self.0[2..])
        } else {
            self.0.clone()
        }
    }

    /// Labels the slot may appear under on a page, most specific first.
    pub fn label_variants(&self) -> Vec<String> {
        let mut variants = vec![self.display_label()];
        if let Some(stripped) = variants[0].strip_prefix('0') {
            variants.push(stripped.to_string());
        }
        variants.push(self.0.clone());
        variants.dedup();
        variants
    }
}

impl fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonical risk key: trimmed, lowercase, inner whitespace as `_`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RiskLevel(String);

impl RiskLevel {
    pub fn parse(raw: &str) -> Self {
        let key = raw
            .trim()
            .to_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join("_");
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Human label guess: `ultra_agresivo` -> `Ultra Agresivo`.
    pub fn display_label(&self) -> String {
        self.0
            .split('_')
            .filter(|w| !w.is_empty())
            .map(|w| {
                let mut chars = w.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect(),
                    None => String::new(),
                }
            })
            .collect::<Vec<String>>()
            .join(" ")
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

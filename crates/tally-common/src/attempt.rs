use crate::selector::Target;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Interaction strategies used to set a dropdown, from most to least precise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Strategy {
    NativeSelectByLabel,
    NativeSelectByAlias,
    CustomClickOpenThenText,
    DirectTextClick,
}

impl Strategy {
    pub const ORDER: [Strategy; 4] = [
        Strategy::NativeSelectByLabel,
        Strategy::NativeSelectByAlias,
        Strategy::CustomClickOpenThenText,
        Strategy::DirectTextClick,
    ];
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Strategy::NativeSelectByLabel => "native_select_by_label",
            Strategy::NativeSelectByAlias => "native_select_by_alias",
            Strategy::CustomClickOpenThenText => "custom_click_open_then_text",
            Strategy::DirectTextClick => "direct_text_click",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "cause", rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure(String),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }
}

/// One strategy tried against one target. Only kept for logging and tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionAttempt {
    pub target: Target,
    pub strategy: Strategy,
    pub outcome: Outcome,
}

/// Channels the download capturer falls back through, most reliable first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Channel {
    ExpectDownloadEvent,
    FallbackTextTrigger,
    DirectLinkFetch,
}

impl Channel {
    pub const ORDER: [Channel; 3] = [
        Channel::ExpectDownloadEvent,
        Channel::FallbackTextTrigger,
        Channel::DirectLinkFetch,
    ];
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Channel::ExpectDownloadEvent => "expect_download_event",
            Channel::FallbackTextTrigger => "fallback_text_trigger",
            Channel::DirectLinkFetch => "direct_link_fetch",
        };
        f.write_str(name)
    }
}

/// Result of one capture. `channel` is the channel that produced the file,
/// or the last one tried when every channel failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadResult {
    pub channel: Channel,
    pub destination: PathBuf,
    pub byte_size: u64,
    pub outcome: Outcome,
}

impl DownloadResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }
}

/// What to click to start a browser download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// A structural locator (CSS selector).
    Selector(String),
    /// Any visible element whose text contains this, case-insensitively.
    Text(String),
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Selector(s) => write!(f, "selector {}", s),
            Trigger::Text(t) => write!(f, "text \"{}\"", t),
        }
    }
}

/// An `<option>` as seen by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionMatch {
    pub label: String,
    #[serde(default)]
    pub value: Option<String>,
}

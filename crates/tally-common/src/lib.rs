pub mod attempt;
pub mod error;
pub mod manifest;
pub mod selector;
pub mod slot;

pub use attempt::{
    Channel, DownloadResult, InteractionAttempt, OptionMatch, Outcome, Strategy, Trigger,
};
pub use error::BackendError;
pub use manifest::{Manifest, ManifestRecord, ManifestStatus, ManifestSummary};
pub use selector::{SelectorRegistry, SelectorSpec, Target, same_label};
pub use slot::{RiskLevel, TimeSlot};

//! Built-in activity kinds

pub mod poll;
pub mod qna;
pub mod word_cloud;

pub use poll::{PollConfig, PollKind};
pub use qna::{QnaConfig, QnaKind};
pub use word_cloud::{WordCloudConfig, WordCloudKind};

use serde::{Deserialize, Serialize};

/// Moderation state attached to stored submissions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModerationStatus {
    /// Held back until a moderator approves it
    Pending,
    /// Visible in public results
    Approved,
}

impl ModerationStatus {
    /// Initial status for a submission under the given moderation flag
    pub fn for_moderation(moderated: bool) -> Self {
        if moderated {
            ModerationStatus::Pending
        } else {
            ModerationStatus::Approved
        }
    }
}

pub(crate) fn default_true() -> bool {
    true
}

/// Round to one decimal, the precision results documents report
/// percentages at
pub(crate) fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

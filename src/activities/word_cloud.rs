use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

use crate::activities::{default_true, round1, ModerationStatus};
use crate::domain::{Activity, ActivityId, ActivityState, Response};
use crate::traits::{ActivityError, ActivityKind};

/// Word cloud configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct WordCloudConfig {
    /// Prompt guiding the word submissions
    #[schemars(length(min = 1, max = 300))]
    pub prompt: String,

    /// Maximum length for an individual word
    #[serde(default = "default_max_word_length")]
    #[schemars(range(min = 3, max = 50))]
    pub max_word_length: usize,

    /// Maximum number of words per submission
    #[serde(default = "default_max_words_per_submission")]
    #[schemars(range(min = 1, max = 10))]
    pub max_words_per_submission: usize,

    /// Whether multi-word phrases are allowed
    #[serde(default)]
    pub allow_phrases: bool,

    /// Whether submissions require moderation
    #[serde(default = "default_true")]
    pub moderate_submissions: bool,

    /// Whether word matching is case sensitive
    #[serde(default)]
    pub case_sensitive: bool,

    /// Whether to show live word cloud updates
    #[serde(default = "default_true")]
    pub show_live_results: bool,

    /// Words filtered out regardless of casing
    #[serde(default)]
    pub banned_words: Vec<String>,
}

fn default_max_word_length() -> usize {
    20
}

fn default_max_words_per_submission() -> usize {
    3
}

impl WordCloudConfig {
    fn from_value(config: &serde_json::Value) -> Result<Self, String> {
        let parsed: WordCloudConfig =
            serde_json::from_value(config.clone()).map_err(|e| e.to_string())?;
        parsed.check()?;
        Ok(parsed)
    }

    fn check(&self) -> Result<(), String> {
        if self.prompt.trim().is_empty() {
            return Err("prompt must be a non-empty string".to_string());
        }
        if self.prompt.chars().count() > 300 {
            return Err("prompt exceeds maximum length of 300 characters".to_string());
        }
        if self.max_word_length < 3 || self.max_word_length > 50 {
            return Err("max_word_length must be between 3 and 50".to_string());
        }
        if self.max_words_per_submission < 1 || self.max_words_per_submission > 10 {
            return Err("max_words_per_submission must be between 1 and 10".to_string());
        }
        for word in &self.banned_words {
            if word.trim().is_empty() {
                return Err("banned words must be non-empty strings".to_string());
            }
        }
        Ok(())
    }
}

/// Raw participant submission
#[derive(Debug, Deserialize)]
struct WordCloudSubmission {
    #[serde(default)]
    words: Vec<String>,
}

/// Canonical stored form of one word cloud response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WordSubmission {
    pub participant_id: Uuid,
    pub words: Vec<String>,
    pub status: ModerationStatus,
    pub submitted_at: DateTime<Utc>,
}

/// Word cloud
///
/// Participants submit a handful of words; each is normalized and checked
/// against the banned list, and approved submissions aggregate into word
/// frequencies with display sizes for cloud rendering.
pub struct WordCloudKind {
    activity_id: Option<ActivityId>,
    config: serde_json::Value,
}

impl WordCloudKind {
    pub const KIND_ID: &'static str = "word_cloud";

    /// How many entries the rendered cloud carries at most
    const CLOUD_LIMIT: usize = 50;

    pub fn new(activity_id: Option<ActivityId>, config: serde_json::Value) -> Self {
        Self {
            activity_id,
            config,
        }
    }

    pub fn config_schema() -> serde_json::Value {
        serde_json::to_value(schemars::schema_for!(WordCloudConfig)).unwrap()
    }

    fn parsed_config(&self) -> Result<WordCloudConfig, ActivityError> {
        WordCloudConfig::from_value(&self.config).map_err(ActivityError::InvalidConfig)
    }

    /// Normalize one word: trim, optionally lowercase, collapse whitespace,
    /// strip everything outside word characters, space and hyphen. Then
    /// enforce the length, phrase and banned-word rules.
    fn normalize_word(config: &WordCloudConfig, word: &str) -> Result<String, ActivityError> {
        let mut cleaned = word.trim().to_string();
        if !config.case_sensitive {
            cleaned = cleaned.to_lowercase();
        }

        let collapsed: String = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
        let cleaned: String = collapsed
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '_' || *c == ' ' || *c == '-')
            .collect();

        if cleaned.is_empty() {
            return Err(ActivityError::InvalidResponse(format!(
                "Word '{word}' becomes empty after cleaning"
            )));
        }

        if cleaned.chars().count() > config.max_word_length {
            return Err(ActivityError::InvalidResponse(format!(
                "Word '{word}' exceeds maximum length of {} characters",
                config.max_word_length
            )));
        }

        if !config.allow_phrases && cleaned.contains(' ') {
            return Err(ActivityError::InvalidResponse(format!(
                "Phrases not allowed: '{word}'"
            )));
        }

        let check = cleaned.to_lowercase();
        if config
            .banned_words
            .iter()
            .any(|banned| banned.to_lowercase() == check)
        {
            return Err(ActivityError::InvalidResponse(format!(
                "Word '{word}' is not allowed"
            )));
        }

        Ok(cleaned)
    }
}

impl ActivityKind for WordCloudKind {
    fn kind_id(&self) -> &'static str {
        Self::KIND_ID
    }

    fn validate_config(&self, config: &serde_json::Value) -> bool {
        match WordCloudConfig::from_value(config) {
            Ok(_) => true,
            Err(reason) => {
                tracing::warn!(%reason, "Rejected word cloud configuration");
                false
            }
        }
    }

    fn schema(&self) -> serde_json::Value {
        Self::config_schema()
    }

    fn process_response(
        &self,
        participant_id: Uuid,
        payload: &serde_json::Value,
    ) -> Result<serde_json::Value, ActivityError> {
        let config = self.parsed_config()?;

        let submission: WordCloudSubmission = serde_json::from_value(payload.clone())
            .map_err(|_| {
                ActivityError::InvalidResponse("Response must contain 'words' as a list".to_string())
            })?;

        if submission.words.is_empty() {
            return Err(ActivityError::InvalidResponse(
                "At least one word must be submitted".to_string(),
            ));
        }
        if submission.words.len() > config.max_words_per_submission {
            return Err(ActivityError::InvalidResponse(format!(
                "Maximum {} words allowed per submission",
                config.max_words_per_submission
            )));
        }

        let words = submission
            .words
            .iter()
            .map(|word| Self::normalize_word(&config, word))
            .collect::<Result<Vec<String>, ActivityError>>()?;

        let record = WordSubmission {
            participant_id,
            words,
            status: ModerationStatus::for_moderation(config.moderate_submissions),
            submitted_at: Utc::now(),
        };

        Ok(serde_json::to_value(record)?)
    }

    fn calculate_results(&self, responses: &[Response]) -> serde_json::Value {
        let config = match self.parsed_config() {
            Ok(config) => config,
            Err(e) => {
                tracing::error!(activity_id = ?self.activity_id, error = %e, "Cannot tally word cloud");
                return serde_json::json!({
                    "type": "word_cloud_results",
                    "error": e.to_string(),
                    "total_responses": responses.len(),
                });
            }
        };

        // Frequency per word in first-seen order, over approved submissions
        // only.
        let mut frequencies: Vec<(String, usize)> = Vec::new();
        let mut index_by_word: HashMap<String, usize> = HashMap::new();
        let mut total_words = 0usize;
        let mut participant_count = 0usize;

        for response in responses {
            let Ok(record) =
                serde_json::from_value::<WordSubmission>(response.payload.clone())
            else {
                tracing::debug!(response_id = %response.id, "Skipping malformed word cloud response");
                continue;
            };

            if record.status != ModerationStatus::Approved {
                continue;
            }

            for word in record.words {
                total_words += 1;
                match index_by_word.get(&word) {
                    Some(&index) => frequencies[index].1 += 1,
                    None => {
                        index_by_word.insert(word.clone(), frequencies.len());
                        frequencies.push((word, 1));
                    }
                }
            }
            participant_count += 1;
        }

        // Most frequent first; stable sort keeps first-seen order for ties
        let mut most_common = frequencies.clone();
        most_common.sort_by(|a, b| b.1.cmp(&a.1));

        let max_frequency = most_common.first().map(|(_, f)| *f).unwrap_or(1);
        let cloud_data: Vec<serde_json::Value> = most_common
            .iter()
            .take(Self::CLOUD_LIMIT)
            .map(|(word, frequency)| {
                let size = ((*frequency as f64 / max_frequency as f64) * 100.0) as u32;
                let percentage = if total_words > 0 {
                    round1(*frequency as f64 / total_words as f64 * 100.0)
                } else {
                    0.0
                };
                serde_json::json!({
                    "word": word,
                    "frequency": frequency,
                    "size": size.clamp(10, 100),
                    "percentage": percentage,
                })
            })
            .collect();

        let word_frequencies: BTreeMap<&str, usize> = frequencies
            .iter()
            .map(|(word, frequency)| (word.as_str(), *frequency))
            .collect();

        serde_json::json!({
            "type": "word_cloud_results",
            "prompt": config.prompt,
            "word_cloud_data": cloud_data,
            "word_frequencies": word_frequencies,
            "most_common_words": most_common.iter().take(10).collect::<Vec<_>>(),
            "unique_word_count": frequencies.len(),
            "total_word_submissions": total_words,
            "participant_count": participant_count,
            "show_live_results": config.show_live_results,
            "allow_phrases": config.allow_phrases,
        })
    }

    fn on_state_change(&self, _old: ActivityState, new: ActivityState, activity: &Activity) {
        match new {
            ActivityState::Active => {
                tracing::info!(activity_id = %activity.id, title = %activity.title, "Word cloud started");
            }
            ActivityState::Expired => {
                tracing::info!(activity_id = %activity.id, "Word cloud ended");
            }
            _ => {}
        }
    }

    fn default_metadata(&self) -> serde_json::Value {
        serde_json::json!({
            "duration_seconds": 600,
            "max_responses": 100,
            "allow_multiple_responses": true,
            "show_live_results": true,
            "requires_moderation": true,
        })
    }
}

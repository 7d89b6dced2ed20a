use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::activities::{default_true, ModerationStatus};
use crate::domain::{Activity, ActivityId, ActivityState, Response};
use crate::traits::{ActivityError, ActivityKind};

/// Q&A session configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct QnaConfig {
    /// Topic or theme for the session
    #[schemars(length(min = 1, max = 200))]
    pub topic: String,

    /// Whether participants can submit questions anonymously
    #[serde(default = "default_true")]
    pub allow_anonymous: bool,

    /// Whether participants can vote on questions
    #[serde(default = "default_true")]
    pub enable_voting: bool,

    /// Whether questions require moderation before becoming visible
    #[serde(default)]
    pub moderate_questions: bool,

    /// Maximum length for submitted questions
    #[serde(default = "default_max_question_length")]
    #[schemars(range(min = 10, max = 1000))]
    pub max_question_length: usize,

    /// Whether a participant's repeat votes on one question all count
    #[serde(default)]
    pub allow_multiple_votes: bool,

    /// Whether vote counts are displayed to participants
    #[serde(default = "default_true")]
    pub show_vote_counts: bool,
}

fn default_max_question_length() -> usize {
    500
}

impl QnaConfig {
    fn from_value(config: &serde_json::Value) -> Result<Self, String> {
        let parsed: QnaConfig =
            serde_json::from_value(config.clone()).map_err(|e| e.to_string())?;
        parsed.check()?;
        Ok(parsed)
    }

    fn check(&self) -> Result<(), String> {
        if self.topic.trim().is_empty() {
            return Err("topic must be a non-empty string".to_string());
        }
        if self.topic.chars().count() > 200 {
            return Err("topic exceeds maximum length of 200 characters".to_string());
        }
        if self.max_question_length < 10 || self.max_question_length > 1000 {
            return Err("max_question_length must be between 10 and 1000".to_string());
        }
        Ok(())
    }
}

/// Raw participant submission, either a question or a vote
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum QnaSubmission {
    Question {
        #[serde(default)]
        question_text: String,
        /// Explicit anonymity request; defaults to the session setting
        anonymous: Option<bool>,
    },
    Vote {
        question_id: Option<String>,
    },
}

/// Canonical stored form of one Q&A response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QnaRecord {
    Question {
        question_id: String,
        participant_id: Uuid,
        question_text: String,
        anonymous: bool,
        status: ModerationStatus,
        submitted_at: DateTime<Utc>,
    },
    Vote {
        participant_id: Uuid,
        question_id: String,
        submitted_at: DateTime<Utc>,
    },
}

/// One question with its replayed vote tally
#[derive(Debug, Clone, Serialize)]
pub struct QuestionTally {
    pub id: String,
    pub text: String,
    pub anonymous: bool,
    pub participant_id: Uuid,
    pub status: ModerationStatus,
    pub submitted_at: DateTime<Utc>,
    pub vote_count: usize,
    pub voters: Vec<Uuid>,
}

/// Moderated Q&A with voting
///
/// Participants submit questions and vote on each other's questions; results
/// replay the full history into a per-question vote tally sorted by
/// popularity, separating approved from pending questions.
pub struct QnaKind {
    activity_id: Option<ActivityId>,
    config: serde_json::Value,
}

impl QnaKind {
    pub const KIND_ID: &'static str = "qna";

    pub fn new(activity_id: Option<ActivityId>, config: serde_json::Value) -> Self {
        Self {
            activity_id,
            config,
        }
    }

    pub fn config_schema() -> serde_json::Value {
        serde_json::to_value(schemars::schema_for!(QnaConfig)).unwrap()
    }

    fn parsed_config(&self) -> Result<QnaConfig, ActivityError> {
        QnaConfig::from_value(&self.config).map_err(ActivityError::InvalidConfig)
    }

    fn process_question(
        &self,
        config: &QnaConfig,
        participant_id: Uuid,
        question_text: &str,
        anonymous: Option<bool>,
    ) -> Result<QnaRecord, ActivityError> {
        let question_text = question_text.trim();

        if question_text.is_empty() {
            return Err(ActivityError::InvalidResponse(
                "Question text cannot be empty".to_string(),
            ));
        }
        if question_text.chars().count() > config.max_question_length {
            return Err(ActivityError::InvalidResponse(format!(
                "Question exceeds maximum length of {} characters",
                config.max_question_length
            )));
        }

        let anonymous = anonymous.unwrap_or(config.allow_anonymous);
        if anonymous && !config.allow_anonymous {
            return Err(ActivityError::InvalidResponse(
                "Anonymous question submissions are not allowed".to_string(),
            ));
        }

        Ok(QnaRecord::Question {
            question_id: format!("q_{}", Uuid::new_v4().simple()),
            participant_id,
            question_text: question_text.to_string(),
            anonymous,
            status: ModerationStatus::for_moderation(config.moderate_questions),
            submitted_at: Utc::now(),
        })
    }

    fn process_vote(
        &self,
        config: &QnaConfig,
        participant_id: Uuid,
        question_id: Option<String>,
    ) -> Result<QnaRecord, ActivityError> {
        let question_id = question_id.filter(|id| !id.is_empty()).ok_or_else(|| {
            ActivityError::InvalidResponse("Vote must specify question_id".to_string())
        })?;

        if !config.enable_voting {
            return Err(ActivityError::InvalidResponse(
                "Voting is not enabled for this Q&A session".to_string(),
            ));
        }

        Ok(QnaRecord::Vote {
            participant_id,
            question_id,
            submitted_at: Utc::now(),
        })
    }
}

impl ActivityKind for QnaKind {
    fn kind_id(&self) -> &'static str {
        Self::KIND_ID
    }

    fn validate_config(&self, config: &serde_json::Value) -> bool {
        match QnaConfig::from_value(config) {
            Ok(_) => true,
            Err(reason) => {
                tracing::warn!(%reason, "Rejected Q&A configuration");
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

        let submission: QnaSubmission =
            serde_json::from_value(payload.clone()).map_err(|_| {
                ActivityError::InvalidResponse(
                    "Response type must be 'question' or 'vote'".to_string(),
                )
            })?;

        let record = match submission {
            QnaSubmission::Question {
                question_text,
                anonymous,
            } => self.process_question(&config, participant_id, &question_text, anonymous)?,
            QnaSubmission::Vote { question_id } => {
                self.process_vote(&config, participant_id, question_id)?
            }
        };

        Ok(serde_json::to_value(record)?)
    }

    fn calculate_results(&self, responses: &[Response]) -> serde_json::Value {
        let config = match self.parsed_config() {
            Ok(config) => config,
            Err(e) => {
                tracing::error!(activity_id = ?self.activity_id, error = %e, "Cannot tally Q&A");
                return serde_json::json!({
                    "type": "qna_results",
                    "error": e.to_string(),
                    "total_responses": responses.len(),
                });
            }
        };

        // Replay history in submission order: questions keyed by id, votes
        // collected per question id.
        let mut questions: Vec<QuestionTally> = Vec::new();
        let mut index_by_id: HashMap<String, usize> = HashMap::new();
        let mut votes: HashMap<String, Vec<Uuid>> = HashMap::new();
        let mut total_votes = 0usize;

        for response in responses {
            let Ok(record) = serde_json::from_value::<QnaRecord>(response.payload.clone()) else {
                tracing::debug!(response_id = %response.id, "Skipping malformed Q&A response");
                continue;
            };

            match record {
                QnaRecord::Question {
                    question_id,
                    participant_id,
                    question_text,
                    anonymous,
                    status,
                    submitted_at,
                } => {
                    if index_by_id.contains_key(&question_id) {
                        continue;
                    }
                    index_by_id.insert(question_id.clone(), questions.len());
                    questions.push(QuestionTally {
                        id: question_id,
                        text: question_text,
                        anonymous,
                        participant_id,
                        status,
                        submitted_at,
                        vote_count: 0,
                        voters: Vec::new(),
                    });
                }
                QnaRecord::Vote {
                    participant_id,
                    question_id,
                    ..
                } => {
                    votes.entry(question_id).or_default().push(participant_id);
                    total_votes += 1;
                }
            }
        }

        for (question_id, voters) in votes {
            let Some(&index) = index_by_id.get(&question_id) else {
                continue;
            };
            let tally = &mut questions[index];

            if config.allow_multiple_votes {
                tally.vote_count = voters.len();
                tally.voters = voters;
            } else {
                let mut unique: Vec<Uuid> = Vec::new();
                for voter in voters {
                    if !unique.contains(&voter) {
                        unique.push(voter);
                    }
                }
                tally.vote_count = unique.len();
                tally.voters = unique;
            }
        }

        // Most popular first; stable sort keeps submission order for ties
        questions.sort_by(|a, b| b.vote_count.cmp(&a.vote_count));

        let total_questions = questions.len();
        let (approved, pending): (Vec<QuestionTally>, Vec<QuestionTally>) = questions
            .into_iter()
            .partition(|q| q.status == ModerationStatus::Approved);

        // Pending questions stay out of the public document while moderation
        // is enabled.
        let pending = if config.moderate_questions {
            Vec::new()
        } else {
            pending
        };

        serde_json::json!({
            "type": "qna_results",
            "topic": config.topic,
            "total_questions": total_questions,
            "total_votes": total_votes,
            "most_popular_question": approved.first(),
            "approved_questions": approved,
            "pending_questions": pending,
            "enable_voting": config.enable_voting,
            "show_vote_counts": config.show_vote_counts,
            "allow_anonymous": config.allow_anonymous,
        })
    }

    fn on_state_change(&self, _old: ActivityState, new: ActivityState, activity: &Activity) {
        match new {
            ActivityState::Active => {
                tracing::info!(activity_id = %activity.id, title = %activity.title, "Q&A session started");
            }
            ActivityState::Expired => {
                tracing::info!(activity_id = %activity.id, "Q&A session ended");
            }
            _ => {}
        }
    }

    fn default_metadata(&self) -> serde_json::Value {
        serde_json::json!({
            "duration_seconds": 900,
            "max_responses": null,
            "allow_multiple_responses": true,
            "show_live_results": true,
            "requires_moderation": true,
        })
    }
}

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::activities::{default_true, round1};
use crate::domain::{Activity, ActivityId, ActivityState, Response};
use crate::traits::{ActivityError, ActivityKind};

/// Poll configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct PollConfig {
    /// The poll question to display to participants
    #[schemars(length(min = 1, max = 500))]
    pub question: String,

    /// Answer options participants choose from
    #[schemars(length(min = 2, max = 10))]
    pub options: Vec<String>,

    /// Whether participants can select multiple options
    #[serde(default)]
    pub allow_multiple_choice: bool,

    /// Whether to show live results to viewers
    #[serde(default = "default_true")]
    pub show_live_results: bool,

    /// Whether voting is anonymous
    #[serde(default = "default_true")]
    pub anonymous_voting: bool,
}

impl PollConfig {
    fn from_value(config: &serde_json::Value) -> Result<Self, String> {
        let parsed: PollConfig =
            serde_json::from_value(config.clone()).map_err(|e| e.to_string())?;
        parsed.check()?;
        Ok(parsed)
    }

    /// Semantic checks the schema alone cannot express
    fn check(&self) -> Result<(), String> {
        if self.question.trim().is_empty() {
            return Err("question must be a non-empty string".to_string());
        }
        if self.question.chars().count() > 500 {
            return Err("question exceeds maximum length of 500 characters".to_string());
        }
        if self.options.len() < 2 {
            return Err("poll must have at least 2 options".to_string());
        }
        if self.options.len() > 10 {
            return Err("poll cannot have more than 10 options".to_string());
        }
        for (i, option) in self.options.iter().enumerate() {
            if option.trim().is_empty() {
                return Err(format!("option {i} must be a non-empty string"));
            }
            if option.chars().count() > 200 {
                return Err(format!("option {i} exceeds maximum length of 200 characters"));
            }
        }
        Ok(())
    }
}

/// Raw participant submission
#[derive(Debug, Deserialize)]
struct PollSubmission {
    #[serde(default)]
    selected_options: Vec<String>,
}

/// Canonical stored form of one poll response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollBallot {
    pub participant_id: Uuid,
    pub selected_options: Vec<String>,
    pub anonymous: bool,
    pub submitted_at: DateTime<Utc>,
}

/// Single/multi choice poll
///
/// Participants select among configured options; results tally per-option
/// counts, percentages of the response total and the option(s) tied for the
/// most votes.
pub struct PollKind {
    activity_id: Option<ActivityId>,
    config: serde_json::Value,
}

impl PollKind {
    pub const KIND_ID: &'static str = "poll";

    pub fn new(activity_id: Option<ActivityId>, config: serde_json::Value) -> Self {
        Self {
            activity_id,
            config,
        }
    }

    /// Configuration schema for registration
    pub fn config_schema() -> serde_json::Value {
        serde_json::to_value(schemars::schema_for!(PollConfig)).unwrap()
    }

    fn parsed_config(&self) -> Result<PollConfig, ActivityError> {
        PollConfig::from_value(&self.config).map_err(ActivityError::InvalidConfig)
    }
}

impl ActivityKind for PollKind {
    fn kind_id(&self) -> &'static str {
        Self::KIND_ID
    }

    fn validate_config(&self, config: &serde_json::Value) -> bool {
        match PollConfig::from_value(config) {
            Ok(_) => true,
            Err(reason) => {
                tracing::warn!(%reason, "Rejected poll configuration");
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

        let submission: PollSubmission = serde_json::from_value(payload.clone())
            .map_err(|_| {
                ActivityError::InvalidResponse(
                    "Response must contain 'selected_options' as a list".to_string(),
                )
            })?;

        for option in &submission.selected_options {
            if !config.options.contains(option) {
                return Err(ActivityError::InvalidResponse(format!(
                    "Invalid option selected: '{option}'"
                )));
            }
        }

        if !config.allow_multiple_choice && submission.selected_options.len() > 1 {
            return Err(ActivityError::InvalidResponse(
                "Multiple choices not allowed for this poll".to_string(),
            ));
        }

        if submission.selected_options.is_empty() {
            return Err(ActivityError::InvalidResponse(
                "At least one option must be selected".to_string(),
            ));
        }

        let ballot = PollBallot {
            participant_id,
            selected_options: submission.selected_options,
            anonymous: config.anonymous_voting,
            submitted_at: Utc::now(),
        };

        Ok(serde_json::to_value(ballot)?)
    }

    fn calculate_results(&self, responses: &[Response]) -> serde_json::Value {
        let config = match self.parsed_config() {
            Ok(config) => config,
            Err(e) => {
                tracing::error!(activity_id = ?self.activity_id, error = %e, "Cannot tally poll");
                return serde_json::json!({
                    "type": "poll_results",
                    "error": e.to_string(),
                    "total_responses": responses.len(),
                });
            }
        };

        let mut vote_counts: BTreeMap<String, usize> = config
            .options
            .iter()
            .map(|option| (option.clone(), 0))
            .collect();
        let mut total_responses = 0usize;

        for response in responses {
            // Responses were validated at write time; anything malformed in
            // the history is skipped rather than failing the tally.
            let Ok(ballot) =
                serde_json::from_value::<PollBallot>(response.payload.clone())
            else {
                tracing::debug!(response_id = %response.id, "Skipping malformed poll response");
                continue;
            };

            for option in &ballot.selected_options {
                if let Some(count) = vote_counts.get_mut(option) {
                    *count += 1;
                }
            }
            total_responses += 1;
        }

        let percentages: BTreeMap<String, f64> = vote_counts
            .iter()
            .map(|(option, count)| {
                let share = if total_responses > 0 {
                    round1(*count as f64 / total_responses as f64 * 100.0)
                } else {
                    0.0
                };
                (option.clone(), share)
            })
            .collect();

        let max_votes = vote_counts.values().copied().max().unwrap_or(0);
        let most_popular: Vec<String> = config
            .options
            .iter()
            .filter(|option| vote_counts.get(*option) == Some(&max_votes))
            .cloned()
            .collect();

        serde_json::json!({
            "type": "poll_results",
            "question": config.question,
            "options": config.options,
            "vote_counts": vote_counts,
            "percentages": percentages,
            "total_responses": total_responses,
            "most_popular": most_popular,
            "allow_multiple_choice": config.allow_multiple_choice,
            "show_live_results": config.show_live_results,
        })
    }

    fn on_state_change(&self, _old: ActivityState, new: ActivityState, activity: &Activity) {
        match new {
            ActivityState::Active => {
                tracing::info!(activity_id = %activity.id, title = %activity.title, "Poll started");
            }
            ActivityState::Expired => {
                tracing::info!(activity_id = %activity.id, "Poll ended");
            }
            _ => {}
        }
    }

    fn default_metadata(&self) -> serde_json::Value {
        serde_json::json!({
            "duration_seconds": 300,
            "max_responses": null,
            "allow_multiple_responses": false,
            "show_live_results": true,
            "requires_moderation": false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> serde_json::Value {
        serde_json::json!({
            "question": "Pick one",
            "options": ["A", "B"],
            "allow_multiple_choice": false,
        })
    }

    fn kind(config: serde_json::Value) -> PollKind {
        PollKind::new(None, config)
    }

    fn ballot(kind: &PollKind, participant: Uuid, options: &[&str]) -> Response {
        let payload = kind
            .process_response(
                participant,
                &serde_json::json!({"selected_options": options}),
            )
            .unwrap();
        Response::new(Uuid::new_v4(), participant, payload)
    }

    #[test]
    fn test_validate_config_accepts_minimal_poll() {
        let kind = kind(config());
        assert!(kind.validate_config(&config()));
    }

    #[test]
    fn test_validate_config_rejects_bad_shapes() {
        let kind = kind(config());

        // Missing question
        assert!(!kind.validate_config(&serde_json::json!({"options": ["A", "B"]})));
        // Single option
        assert!(!kind.validate_config(&serde_json::json!({
            "question": "Q", "options": ["A"]
        })));
        // Empty option
        assert!(!kind.validate_config(&serde_json::json!({
            "question": "Q", "options": ["A", "  "]
        })));
        // Too many options
        let options: Vec<String> = (0..11).map(|i| format!("O{i}")).collect();
        assert!(!kind.validate_config(&serde_json::json!({
            "question": "Q", "options": options
        })));
        // Overlong question
        assert!(!kind.validate_config(&serde_json::json!({
            "question": "q".repeat(501), "options": ["A", "B"]
        })));
        // Unknown field
        assert!(!kind.validate_config(&serde_json::json!({
            "question": "Q", "options": ["A", "B"], "surprise": 1
        })));
        // Wrong flag type
        assert!(!kind.validate_config(&serde_json::json!({
            "question": "Q", "options": ["A", "B"], "allow_multiple_choice": "yes"
        })));
    }

    #[test]
    fn test_schema_is_well_formed() {
        let schema = kind(config()).schema();

        assert_eq!(schema["type"], "object");
        assert!(schema["required"]
            .as_array()
            .unwrap()
            .contains(&serde_json::json!("question")));
        assert!(schema["properties"]["options"].is_object());
    }

    #[test]
    fn test_process_response_normalizes_ballot() {
        let kind = kind(config());
        let participant = Uuid::new_v4();

        let payload = kind
            .process_response(participant, &serde_json::json!({"selected_options": ["A"]}))
            .unwrap();

        let ballot: PollBallot = serde_json::from_value(payload).unwrap();
        assert_eq!(ballot.participant_id, participant);
        assert_eq!(ballot.selected_options, vec!["A"]);
        assert!(ballot.anonymous);
    }

    #[test]
    fn test_process_response_rejects_unknown_option() {
        let kind = kind(config());

        let result =
            kind.process_response(Uuid::new_v4(), &serde_json::json!({"selected_options": ["C"]}));

        assert!(matches!(result, Err(ActivityError::InvalidResponse(reason)) if reason.contains("'C'")));
    }

    #[test]
    fn test_process_response_rejects_multi_select_when_disallowed() {
        let kind = kind(config());

        let result = kind.process_response(
            Uuid::new_v4(),
            &serde_json::json!({"selected_options": ["A", "B"]}),
        );

        assert!(matches!(result, Err(ActivityError::InvalidResponse(_))));
    }

    #[test]
    fn test_process_response_allows_multi_select_when_enabled() {
        let kind = kind(serde_json::json!({
            "question": "Pick any",
            "options": ["A", "B", "C"],
            "allow_multiple_choice": true,
        }));

        let payload = kind
            .process_response(
                Uuid::new_v4(),
                &serde_json::json!({"selected_options": ["A", "C"]}),
            )
            .unwrap();

        let ballot: PollBallot = serde_json::from_value(payload).unwrap();
        assert_eq!(ballot.selected_options, vec!["A", "C"]);
    }

    #[test]
    fn test_process_response_rejects_empty_selection() {
        let kind = kind(config());

        let result =
            kind.process_response(Uuid::new_v4(), &serde_json::json!({"selected_options": []}));
        assert!(matches!(result, Err(ActivityError::InvalidResponse(_))));

        let result = kind.process_response(Uuid::new_v4(), &serde_json::json!({}));
        assert!(matches!(result, Err(ActivityError::InvalidResponse(_))));
    }

    #[test]
    fn test_calculate_results_tallies_votes() {
        let kind = kind(config());
        let responses = vec![
            ballot(&kind, Uuid::new_v4(), &["A"]),
            ballot(&kind, Uuid::new_v4(), &["A"]),
            ballot(&kind, Uuid::new_v4(), &["B"]),
        ];

        let results = kind.calculate_results(&responses);

        assert_eq!(results["type"], "poll_results");
        assert_eq!(results["vote_counts"]["A"], 2);
        assert_eq!(results["vote_counts"]["B"], 1);
        assert_eq!(results["percentages"]["A"], 66.7);
        assert_eq!(results["percentages"]["B"], 33.3);
        assert_eq!(results["total_responses"], 3);
        assert_eq!(results["most_popular"], serde_json::json!(["A"]));
    }

    #[test]
    fn test_single_choice_vote_counts_sum_to_total() {
        let kind = kind(config());
        let responses: Vec<Response> = (0..7)
            .map(|i| ballot(&kind, Uuid::new_v4(), if i % 3 == 0 { &["B"] } else { &["A"] }))
            .collect();

        let results = kind.calculate_results(&responses);

        let sum: u64 = results["vote_counts"]
            .as_object()
            .unwrap()
            .values()
            .map(|v| v.as_u64().unwrap())
            .sum();
        assert_eq!(sum, results["total_responses"].as_u64().unwrap());

        let percent_sum: f64 = results["percentages"]
            .as_object()
            .unwrap()
            .values()
            .map(|v| v.as_f64().unwrap())
            .sum();
        assert!((percent_sum - 100.0).abs() <= 0.1);
    }

    #[test]
    fn test_calculate_results_empty_history() {
        let kind = kind(config());

        let results = kind.calculate_results(&[]);

        assert_eq!(results["total_responses"], 0);
        assert_eq!(results["vote_counts"]["A"], 0);
        assert_eq!(results["percentages"]["A"], 0.0);
        // With no votes every option ties at zero
        assert_eq!(results["most_popular"], serde_json::json!(["A", "B"]));
    }

    #[test]
    fn test_calculate_results_skips_malformed_history_entries() {
        let kind = kind(config());
        let mut responses = vec![ballot(&kind, Uuid::new_v4(), &["A"])];
        responses.push(Response::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            serde_json::json!({"garbage": true}),
        ));

        let results = kind.calculate_results(&responses);

        assert_eq!(results["total_responses"], 1);
        assert_eq!(results["vote_counts"]["A"], 1);
    }

    #[test]
    fn test_ties_report_every_leader() {
        let kind = kind(config());
        let responses = vec![
            ballot(&kind, Uuid::new_v4(), &["A"]),
            ballot(&kind, Uuid::new_v4(), &["B"]),
        ];

        let results = kind.calculate_results(&responses);

        assert_eq!(results["most_popular"], serde_json::json!(["A", "B"]));
    }

    #[test]
    fn test_default_metadata() {
        let metadata = kind(config()).default_metadata();

        assert_eq!(metadata["duration_seconds"], 300);
        assert_eq!(metadata["requires_moderation"], false);
    }
}

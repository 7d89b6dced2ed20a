use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Activity ID (unique across sessions)
pub type ActivityId = Uuid;

/// Activity lifecycle state
///
/// Responses are accepted only while `Active`. `Expired` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ActivityState {
    /// Being edited by the operator, not visible to participants
    Draft,
    /// Visible to participants but not yet accepting responses
    Published,
    /// Accepting responses
    Active,
    /// Closed, no further responses or transitions
    Expired,
}

impl ActivityState {
    /// All lifecycle states, in lifecycle order
    pub const ALL: [ActivityState; 4] = [
        ActivityState::Draft,
        ActivityState::Published,
        ActivityState::Active,
        ActivityState::Expired,
    ];

    /// The serialized (snake_case) form of the state
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityState::Draft => "draft",
            ActivityState::Published => "published",
            ActivityState::Active => "active",
            ActivityState::Expired => "expired",
        }
    }
}

impl fmt::Display for ActivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An activity within a session
///
/// The record is owned by the persistence layer; the framework re-reads it,
/// mutates it and hands it back on every operation. `kind` must resolve in
/// the registry, `config` must have been accepted by that kind's
/// `validate_config`, and `expires_at` is set only once the activity goes
/// `Active` with a configured duration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Activity {
    /// Unique ID
    pub id: ActivityId,

    /// Owning session
    pub session_id: Uuid,

    /// Kind identifier (e.g., "poll")
    pub kind: String,

    /// Display title
    pub title: String,

    /// Optional longer description
    pub description: Option<String>,

    /// Kind-specific configuration (opaque to everything but the kind)
    #[serde(default)]
    pub config: serde_json::Value,

    /// Position within the owning session
    pub order_index: i32,

    /// Current lifecycle state
    pub state: ActivityState,

    /// When the activity stops accepting responses, once known
    pub expires_at: Option<DateTime<Utc>>,

    /// Framework metadata (duration, response limits, visibility flags)
    #[serde(default)]
    pub metadata: serde_json::Value,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Activity {
    /// Create a new draft activity
    pub fn new(session_id: Uuid, kind: String, title: String, config: serde_json::Value) -> Self {
        Self::new_at(session_id, kind, title, config, Utc::now())
    }

    /// Create a new draft activity with an explicit creation instant
    pub fn new_at(
        session_id: Uuid,
        kind: String,
        title: String,
        config: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            kind,
            title,
            description: None,
            config,
            order_index: 0,
            state: ActivityState::Draft,
            expires_at: None,
            metadata: serde_json::Value::Null,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_description(mut self, description: String) -> Self {
        self.description = Some(description);
        self
    }

    pub fn with_order_index(mut self, order_index: i32) -> Self {
        self.order_index = order_index;
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Whether the activity currently accepts participant responses
    pub fn accepts_responses(&self) -> bool {
        self.state == ActivityState::Active
    }

    /// Configured duration in seconds, if the metadata carries one
    pub fn duration_seconds(&self) -> Option<i64> {
        self.metadata
            .get("duration_seconds")
            .and_then(serde_json::Value::as_i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_activity_starts_as_draft() {
        let config = serde_json::json!({"question": "Pick one", "options": ["A", "B"]});
        let activity = Activity::new(
            Uuid::new_v4(),
            "poll".to_string(),
            "Warm-up poll".to_string(),
            config.clone(),
        );

        assert_eq!(activity.kind, "poll");
        assert_eq!(activity.state, ActivityState::Draft);
        assert_eq!(activity.config, config);
        assert!(activity.expires_at.is_none());
        assert!(!activity.accepts_responses());
    }

    #[test]
    fn test_duration_seconds_reads_metadata() {
        let activity = Activity::new(
            Uuid::new_v4(),
            "poll".to_string(),
            "Poll".to_string(),
            serde_json::json!({}),
        )
        .with_metadata(serde_json::json!({"duration_seconds": 300}));

        assert_eq!(activity.duration_seconds(), Some(300));
    }

    #[test]
    fn test_duration_seconds_absent_or_null() {
        let activity = Activity::new(
            Uuid::new_v4(),
            "poll".to_string(),
            "Poll".to_string(),
            serde_json::json!({}),
        );
        assert_eq!(activity.duration_seconds(), None);

        let activity = activity.with_metadata(serde_json::json!({"duration_seconds": null}));
        assert_eq!(activity.duration_seconds(), None);
    }

    #[test]
    fn test_state_serializes_snake_case() {
        let json = serde_json::to_string(&ActivityState::Published).unwrap();
        assert_eq!(json, "\"published\"");

        let state: ActivityState = serde_json::from_str("\"expired\"").unwrap();
        assert_eq!(state, ActivityState::Expired);
    }

    #[test]
    fn test_state_display_matches_serialized_form() {
        for state in ActivityState::ALL {
            let json = serde_json::to_string(&state).unwrap();
            assert_eq!(json, format!("\"{state}\""));
        }
    }

    #[test]
    fn test_activity_roundtrip() {
        let activity = Activity::new(
            Uuid::new_v4(),
            "word_cloud".to_string(),
            "One word".to_string(),
            serde_json::json!({"prompt": "Describe today"}),
        )
        .with_description("Icebreaker".to_string())
        .with_order_index(2);

        let json = serde_json::to_string(&activity).unwrap();
        let deserialized: Activity = serde_json::from_str(&json).unwrap();

        assert_eq!(deserialized, activity);
    }
}

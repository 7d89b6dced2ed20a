use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::ActivityId;

/// One participant submission against an activity
///
/// The payload is the normalized form produced by the owning kind's
/// `process_response`; raw participant input is never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Response {
    pub id: Uuid,
    pub activity_id: ActivityId,
    pub participant_id: Uuid,

    /// Normalized payload (shape defined by the owning kind)
    #[serde(default)]
    pub payload: serde_json::Value,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Response {
    pub fn new(activity_id: ActivityId, participant_id: Uuid, payload: serde_json::Value) -> Self {
        Self::new_at(activity_id, participant_id, payload, Utc::now())
    }

    pub fn new_at(
        activity_id: ActivityId,
        participant_id: Uuid,
        payload: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            activity_id,
            participant_id,
            payload,
            created_at: now,
            updated_at: now,
        }
    }
}

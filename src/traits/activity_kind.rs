use uuid::Uuid;

use crate::domain::{Activity, ActivityState, Response};

/// Trait every activity kind implements
///
/// A kind is instantiated per request from `(optional activity id, config)`
/// by the registry and encapsulates everything type-specific: config
/// validation, the config schema, response normalization and results
/// aggregation. Only the methods that differ from the defaults need to be
/// overridden.
pub trait ActivityKind: Send + Sync {
    /// Unique kind identifier (e.g., "poll")
    /// MUST be stable across versions for backwards compatibility
    fn kind_id(&self) -> &'static str;

    /// Structural and semantic validation of a configuration document,
    /// beyond what the JSON schema alone can express
    fn validate_config(&self, config: &serde_json::Value) -> bool;

    /// JSON Schema for the configuration document
    ///
    /// Must stay backward compatible within the kind's major version.
    fn schema(&self) -> serde_json::Value;

    /// Validate and normalize one participant submission into the canonical
    /// storage form for this kind
    fn process_response(
        &self,
        participant_id: Uuid,
        payload: &serde_json::Value,
    ) -> Result<serde_json::Value, ActivityError>;

    /// Aggregate the full response history into a read-optimized results
    /// document
    ///
    /// Pure and total: an empty history yields zeroed aggregates, and
    /// malformed entries are skipped rather than failing the aggregation.
    fn calculate_results(&self, responses: &[Response]) -> serde_json::Value;

    /// Kind-specific restrictions on top of the framework transition table
    /// (optional, default = no extra restrictions)
    fn can_transition_to(&self, current: ActivityState, target: ActivityState) -> bool {
        let _ = (current, target);
        true
    }

    /// Side-effect hook invoked after a state change (optional, default = no-op)
    fn on_state_change(&self, old: ActivityState, new: ActivityState, activity: &Activity) {
        let _ = (old, new, activity);
    }

    /// Kind-specific metadata defaults, merged under caller overrides at
    /// activity creation
    fn default_metadata(&self) -> serde_json::Value {
        serde_json::json!({
            "duration_seconds": null,
            "max_responses": null,
            "allow_multiple_responses": false,
            "show_live_results": true,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ActivityError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

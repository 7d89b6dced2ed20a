use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::application::store::{ActivityStore, StoreError};
use crate::domain::{Activity, ActivityId, ActivityState, Response};
use crate::framework::{
    ActivityRegistry, ActivityStateMachine, KindMetadata, RegistryError, TransitionError,
    TransitionValidation,
};
use crate::traits::ActivityError;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Activity not found: {0}")]
    ActivityNotFound(Uuid),

    #[error("Activity {id} is not accepting responses (state: {state})")]
    NotAcceptingResponses { id: Uuid, state: ActivityState },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Activity(#[from] ActivityError),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Request to create an activity
#[derive(Debug, Clone)]
pub struct CreateActivity {
    pub session_id: Uuid,
    pub kind: String,
    pub title: String,
    pub description: Option<String>,
    pub config: serde_json::Value,
    /// Metadata overrides, merged over the kind's defaults
    pub metadata: Option<serde_json::Value>,
    pub order_index: i32,
}

/// Result of a configuration validation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ConfigValidation {
    pub valid: bool,
    pub errors: Vec<String>,
}

/// Snapshot of an activity's framework state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ActivityStatusReport {
    pub id: ActivityId,
    pub kind: String,
    pub state: ActivityState,
    pub valid_transitions: Vec<ActivityState>,
    pub accepting_responses: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub response_count: usize,
}

/// Orchestrates registry, state machine and persistence
///
/// Stateless between calls: every operation re-reads the activity record
/// from the store, mutates it and hands it back. Concurrent response
/// submissions for one activity are not serialized here; callers needing
/// per-activity ordering must provide it.
pub struct ActivityService<S> {
    registry: Arc<ActivityRegistry>,
    store: S,
}

impl<S: ActivityStore> ActivityService<S> {
    pub fn new(registry: Arc<ActivityRegistry>, store: S) -> Self {
        Self { registry, store }
    }

    pub fn registry(&self) -> &ActivityRegistry {
        &self.registry
    }

    /// Create a draft activity of a registered kind
    ///
    /// The configuration must satisfy the kind's validation; kind default
    /// metadata is merged under any caller-supplied overrides.
    pub async fn create_activity(&self, request: CreateActivity) -> Result<Activity, ServiceError> {
        let instance = self
            .registry
            .create(&request.kind, None, request.config.clone())?;

        if !instance.validate_config(&request.config) {
            return Err(ActivityError::InvalidConfig(format!(
                "Configuration rejected for kind '{}'",
                request.kind
            ))
            .into());
        }

        let metadata = merge_metadata(instance.default_metadata(), request.metadata);

        let mut activity = Activity::new(
            request.session_id,
            request.kind,
            request.title,
            request.config,
        )
        .with_order_index(request.order_index)
        .with_metadata(metadata);
        activity.description = request.description;

        self.store.save_activity(&activity).await?;

        tracing::info!(activity_id = %activity.id, kind = %activity.kind, "Created activity");
        Ok(activity)
    }

    pub async fn get_activity(&self, activity_id: ActivityId) -> Result<Activity, ServiceError> {
        self.store
            .load_activity(activity_id)
            .await?
            .ok_or(ServiceError::ActivityNotFound(activity_id))
    }

    /// Transition an activity's lifecycle state
    ///
    /// Kind-specific restrictions are layered on the base table; `force`
    /// bypasses both and is always logged.
    pub async fn transition(
        &self,
        activity_id: ActivityId,
        target: ActivityState,
        reason: Option<&str>,
        force: bool,
    ) -> Result<Activity, ServiceError> {
        let mut activity = self.get_activity(activity_id).await?;
        let instance = self
            .registry
            .create(&activity.kind, Some(activity_id), activity.config.clone())?;

        let old = activity.state;

        if force {
            tracing::warn!(activity_id = %activity_id, from = %old, to = %target, reason, "Forced transition requested");
        } else if !instance.can_transition_to(old, target) {
            let valid = ActivityStateMachine::valid_transitions(old)
                .iter()
                .copied()
                .filter(|candidate| instance.can_transition_to(old, *candidate))
                .collect();
            return Err(TransitionError::InvalidTransition {
                from: old,
                to: target,
                valid,
            }
            .into());
        }

        ActivityStateMachine::transition(&mut activity, target, reason, force)?;
        instance.on_state_change(old, target, &activity);

        self.store.save_activity(&activity).await?;
        Ok(activity)
    }

    /// Pre-flight check of a transition request, without mutating anything
    pub async fn validate_transition(
        &self,
        activity_id: ActivityId,
        target: ActivityState,
    ) -> Result<TransitionValidation, ServiceError> {
        let activity = self.get_activity(activity_id).await?;
        Ok(ActivityStateMachine::validate_transition_request(
            activity.state,
            target,
            &activity.kind,
            &activity.config,
            &self.registry,
        ))
    }

    /// Process and persist one participant response
    ///
    /// The payload is routed through the owning kind's `process_response`;
    /// only the normalized form is stored.
    pub async fn submit_response(
        &self,
        activity_id: ActivityId,
        participant_id: Uuid,
        payload: serde_json::Value,
    ) -> Result<Response, ServiceError> {
        let activity = self.get_activity(activity_id).await?;

        if !activity.accepts_responses() {
            return Err(ServiceError::NotAcceptingResponses {
                id: activity_id,
                state: activity.state,
            });
        }

        let instance = self
            .registry
            .create(&activity.kind, Some(activity_id), activity.config.clone())?;
        let normalized = instance.process_response(participant_id, &payload)?;

        let response = Response::new(activity_id, participant_id, normalized);
        self.store.save_response(&response).await?;

        tracing::info!(
            activity_id = %activity_id,
            participant_id = %participant_id,
            "Processed response"
        );
        Ok(response)
    }

    /// Aggregate the activity's full response history
    pub async fn results(&self, activity_id: ActivityId) -> Result<serde_json::Value, ServiceError> {
        let activity = self.get_activity(activity_id).await?;
        let responses = self.store.load_responses(activity_id).await?;
        let instance = self
            .registry
            .create(&activity.kind, Some(activity_id), activity.config.clone())?;

        Ok(instance.calculate_results(&responses))
    }

    /// Expire overdue activities, using the host clock
    ///
    /// Intended to be driven by a single external scheduler tick; a
    /// concurrent sweep can at worst re-attempt transitions the table then
    /// rejects.
    pub async fn check_expired(&self) -> Result<Vec<ActivityId>, ServiceError> {
        self.check_expired_at(Utc::now()).await
    }

    /// Expire overdue activities as of an explicit instant
    pub async fn check_expired_at(&self, now: DateTime<Utc>) -> Result<Vec<ActivityId>, ServiceError> {
        let mut candidates = self.store.load_expiring_activities().await?;
        let expired = ActivityStateMachine::check_expired_at(&mut candidates, now);

        for activity in candidates.iter().filter(|a| expired.contains(&a.id)) {
            self.store.save_activity(activity).await?;

            match self
                .registry
                .create(&activity.kind, Some(activity.id), activity.config.clone())
            {
                Ok(instance) => {
                    instance.on_state_change(ActivityState::Active, ActivityState::Expired, activity)
                }
                Err(e) => {
                    tracing::warn!(activity_id = %activity.id, error = %e, "Expired activity of unregistered kind")
                }
            }
        }

        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "Auto-expired activities");
        }
        Ok(expired)
    }

    /// Metadata for every registered kind
    pub fn list_kinds(&self) -> Vec<KindMetadata> {
        self.registry.list_all().into_iter().cloned().collect()
    }

    /// Configuration schema for a kind
    pub fn schema_of(&self, kind_id: &str) -> Result<serde_json::Value, ServiceError> {
        Ok(self.registry.schema_of(kind_id)?.clone())
    }

    /// Validate a configuration against a kind without creating anything
    pub fn validate_config(
        &self,
        kind_id: &str,
        config: &serde_json::Value,
    ) -> Result<ConfigValidation, ServiceError> {
        let instance = self.registry.create(kind_id, None, config.clone())?;
        let valid = instance.validate_config(config);

        Ok(ConfigValidation {
            valid,
            errors: if valid {
                Vec::new()
            } else {
                vec!["Configuration validation failed".to_string()]
            },
        })
    }

    /// Framework status snapshot for one activity
    pub async fn activity_status(
        &self,
        activity_id: ActivityId,
    ) -> Result<ActivityStatusReport, ServiceError> {
        let activity = self.get_activity(activity_id).await?;
        let responses = self.store.load_responses(activity_id).await?;

        Ok(ActivityStatusReport {
            id: activity.id,
            kind: activity.kind.clone(),
            state: activity.state,
            valid_transitions: ActivityStateMachine::valid_transitions(activity.state).to_vec(),
            accepting_responses: activity.accepts_responses(),
            expires_at: activity.expires_at,
            response_count: responses.len(),
        })
    }
}

/// Shallow merge of caller metadata over kind defaults
fn merge_metadata(
    defaults: serde_json::Value,
    overrides: Option<serde_json::Value>,
) -> serde_json::Value {
    match (defaults, overrides) {
        (serde_json::Value::Object(mut base), Some(serde_json::Value::Object(over))) => {
            for (key, value) in over {
                base.insert(key, value);
            }
            serde_json::Value::Object(base)
        }
        (_, Some(overrides)) if !overrides.is_null() => overrides,
        (defaults, _) => defaults,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::registration::builtin_registry;
    use crate::application::store::MemoryStore;
    use chrono::Duration;

    fn service() -> ActivityService<MemoryStore> {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
        ActivityService::new(Arc::new(builtin_registry()), MemoryStore::new())
    }

    fn poll_request() -> CreateActivity {
        CreateActivity {
            session_id: Uuid::new_v4(),
            kind: "poll".to_string(),
            title: "Warm-up".to_string(),
            description: None,
            config: serde_json::json!({
                "question": "Pick one",
                "options": ["A", "B"],
                "allow_multiple_choice": false,
            }),
            metadata: None,
            order_index: 0,
        }
    }

    async fn activate(service: &ActivityService<MemoryStore>, id: ActivityId) {
        service
            .transition(id, ActivityState::Published, None, false)
            .await
            .unwrap();
        service
            .transition(id, ActivityState::Active, None, false)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_create_activity_merges_default_metadata() {
        let service = service();

        let activity = service.create_activity(poll_request()).await.unwrap();

        assert_eq!(activity.state, ActivityState::Draft);
        // Poll defaults land under the caller's (absent) overrides
        assert_eq!(activity.metadata["duration_seconds"], 300);
        assert_eq!(activity.metadata["requires_moderation"], false);
    }

    #[tokio::test]
    async fn test_create_activity_keeps_caller_metadata_overrides() {
        let service = service();
        let mut request = poll_request();
        request.metadata = Some(serde_json::json!({"duration_seconds": 60, "custom": "x"}));

        let activity = service.create_activity(request).await.unwrap();

        assert_eq!(activity.metadata["duration_seconds"], 60);
        assert_eq!(activity.metadata["custom"], "x");
        // Untouched defaults survive
        assert_eq!(activity.metadata["show_live_results"], true);
    }

    #[tokio::test]
    async fn test_create_activity_unknown_kind() {
        let service = service();
        let mut request = poll_request();
        request.kind = "karaoke".to_string();

        let result = service.create_activity(request).await;

        assert!(matches!(
            result,
            Err(ServiceError::Registry(RegistryError::UnknownKind(_)))
        ));
    }

    #[tokio::test]
    async fn test_create_activity_invalid_config() {
        let service = service();
        let mut request = poll_request();
        request.config = serde_json::json!({"question": "Q", "options": ["only one"]});

        let result = service.create_activity(request).await;

        assert!(matches!(
            result,
            Err(ServiceError::Activity(ActivityError::InvalidConfig(_)))
        ));
    }

    #[tokio::test]
    async fn test_draft_to_active_rejected_with_valid_targets() {
        let service = service();
        let activity = service.create_activity(poll_request()).await.unwrap();

        let result = service
            .transition(activity.id, ActivityState::Active, None, false)
            .await;

        match result {
            Err(ServiceError::Transition(TransitionError::InvalidTransition { valid, .. })) => {
                assert_eq!(valid, vec![ActivityState::Published]);
            }
            other => panic!("expected InvalidTransition, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_forced_transition_succeeds() {
        let service = service();
        let activity = service.create_activity(poll_request()).await.unwrap();

        let activity = service
            .transition(activity.id, ActivityState::Active, Some("testing"), true)
            .await
            .unwrap();

        assert_eq!(activity.state, ActivityState::Active);
    }

    #[tokio::test]
    async fn test_poll_scenario_end_to_end() {
        let service = service();
        let activity = service.create_activity(poll_request()).await.unwrap();
        activate(&service, activity.id).await;

        for _ in 0..2 {
            service
                .submit_response(
                    activity.id,
                    Uuid::new_v4(),
                    serde_json::json!({"selected_options": ["A"]}),
                )
                .await
                .unwrap();
        }
        service
            .submit_response(
                activity.id,
                Uuid::new_v4(),
                serde_json::json!({"selected_options": ["B"]}),
            )
            .await
            .unwrap();

        let results = service.results(activity.id).await.unwrap();

        assert_eq!(results["vote_counts"]["A"], 2);
        assert_eq!(results["vote_counts"]["B"], 1);
        assert_eq!(results["percentages"]["A"], 66.7);
        assert_eq!(results["percentages"]["B"], 33.3);
        assert_eq!(results["most_popular"], serde_json::json!(["A"]));
    }

    #[tokio::test]
    async fn test_submit_response_requires_active_state() {
        let service = service();
        let activity = service.create_activity(poll_request()).await.unwrap();

        let result = service
            .submit_response(
                activity.id,
                Uuid::new_v4(),
                serde_json::json!({"selected_options": ["A"]}),
            )
            .await;

        assert!(matches!(
            result,
            Err(ServiceError::NotAcceptingResponses {
                state: ActivityState::Draft,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_invalid_response_is_not_persisted() {
        let service = service();
        let activity = service.create_activity(poll_request()).await.unwrap();
        activate(&service, activity.id).await;

        let result = service
            .submit_response(
                activity.id,
                Uuid::new_v4(),
                serde_json::json!({"selected_options": ["C"]}),
            )
            .await;
        assert!(matches!(
            result,
            Err(ServiceError::Activity(ActivityError::InvalidResponse(_)))
        ));

        let results = service.results(activity.id).await.unwrap();
        assert_eq!(results["total_responses"], 0);
    }

    #[tokio::test]
    async fn test_submit_response_unknown_activity() {
        let service = service();

        let result = service
            .submit_response(Uuid::new_v4(), Uuid::new_v4(), serde_json::json!({}))
            .await;

        assert!(matches!(result, Err(ServiceError::ActivityNotFound(_))));
    }

    #[tokio::test]
    async fn test_activation_schedules_expiry_and_sweep_expires() {
        let service = service();
        let mut request = poll_request();
        request.metadata = Some(serde_json::json!({"duration_seconds": 60}));
        let activity = service.create_activity(request).await.unwrap();

        activate(&service, activity.id).await;

        let activity = service.get_activity(activity.id).await.unwrap();
        let expires_at = activity.expires_at.expect("expiry scheduled on activation");

        // One second before the deadline nothing expires
        let expired = service
            .check_expired_at(expires_at - Duration::seconds(1))
            .await
            .unwrap();
        assert!(expired.is_empty());

        // Just past the deadline the sweep transitions it
        let expired = service
            .check_expired_at(expires_at + Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(expired, vec![activity.id]);

        let activity = service.get_activity(activity.id).await.unwrap();
        assert_eq!(activity.state, ActivityState::Expired);
        assert!(!activity.accepts_responses());
    }

    #[tokio::test]
    async fn test_validate_transition_preflight() {
        let service = service();
        let activity = service.create_activity(poll_request()).await.unwrap();

        let validation = service
            .validate_transition(activity.id, ActivityState::Active)
            .await
            .unwrap();
        assert!(!validation.valid);

        let validation = service
            .validate_transition(activity.id, ActivityState::Published)
            .await
            .unwrap();
        assert!(validation.valid);
    }

    #[tokio::test]
    async fn test_list_kinds_and_schemas() {
        let service = service();

        let ids: Vec<String> = service.list_kinds().into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec!["poll", "qna", "word_cloud"]);

        for id in ids {
            let schema = service.schema_of(&id).unwrap();
            assert_eq!(schema["type"], "object");
            assert!(schema["required"].is_array());
        }

        assert!(matches!(
            service.schema_of("karaoke"),
            Err(ServiceError::Registry(RegistryError::UnknownKind(_)))
        ));
    }

    #[tokio::test]
    async fn test_validate_config_endpoint() {
        let service = service();

        let ok = service
            .validate_config(
                "poll",
                &serde_json::json!({"question": "Q", "options": ["A", "B"]}),
            )
            .unwrap();
        assert!(ok.valid);
        assert!(ok.errors.is_empty());

        let bad = service
            .validate_config("poll", &serde_json::json!({"question": "Q"}))
            .unwrap();
        assert!(!bad.valid);
        assert!(!bad.errors.is_empty());

        assert!(matches!(
            service.validate_config("karaoke", &serde_json::json!({})),
            Err(ServiceError::Registry(RegistryError::UnknownKind(_)))
        ));
    }

    #[tokio::test]
    async fn test_activity_status_report() {
        let service = service();
        let activity = service.create_activity(poll_request()).await.unwrap();

        let report = service.activity_status(activity.id).await.unwrap();
        assert_eq!(report.state, ActivityState::Draft);
        assert_eq!(report.valid_transitions, vec![ActivityState::Published]);
        assert!(!report.accepting_responses);
        assert_eq!(report.response_count, 0);

        activate(&service, activity.id).await;
        service
            .submit_response(
                activity.id,
                Uuid::new_v4(),
                serde_json::json!({"selected_options": ["A"]}),
            )
            .await
            .unwrap();

        let report = service.activity_status(activity.id).await.unwrap();
        assert_eq!(report.state, ActivityState::Active);
        assert!(report.accepting_responses);
        assert_eq!(report.response_count, 1);
    }

    #[tokio::test]
    async fn test_qna_flow_through_service() {
        let service = service();
        let request = CreateActivity {
            session_id: Uuid::new_v4(),
            kind: "qna".to_string(),
            title: "AMA".to_string(),
            description: Some("Ask the team".to_string()),
            config: serde_json::json!({"topic": "Release QA"}),
            metadata: None,
            order_index: 1,
        };
        let activity = service.create_activity(request).await.unwrap();
        // Q&A defaults to requiring moderation
        assert_eq!(activity.metadata["requires_moderation"], true);

        activate(&service, activity.id).await;

        let question = service
            .submit_response(
                activity.id,
                Uuid::new_v4(),
                serde_json::json!({"type": "question", "question_text": "When do we ship?"}),
            )
            .await
            .unwrap();
        let question_id = question.payload["question_id"].as_str().unwrap().to_string();

        let voter = Uuid::new_v4();
        for _ in 0..2 {
            service
                .submit_response(
                    activity.id,
                    voter,
                    serde_json::json!({"type": "vote", "question_id": question_id.clone()}),
                )
                .await
                .unwrap();
        }

        let results = service.results(activity.id).await.unwrap();
        // Repeat votes from one participant collapse at aggregation
        assert_eq!(results["approved_questions"][0]["vote_count"], 1);
    }

    #[test]
    fn test_merge_metadata_shapes() {
        let defaults = serde_json::json!({"a": 1, "b": 2});

        assert_eq!(merge_metadata(defaults.clone(), None), defaults);
        assert_eq!(
            merge_metadata(defaults.clone(), Some(serde_json::json!({"b": 9, "c": 3}))),
            serde_json::json!({"a": 1, "b": 9, "c": 3})
        );
        assert_eq!(
            merge_metadata(defaults.clone(), Some(serde_json::Value::Null)),
            defaults
        );
    }
}

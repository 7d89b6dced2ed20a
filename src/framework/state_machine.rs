use chrono::{DateTime, Duration, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::{Activity, ActivityId, ActivityState};
use crate::framework::registry::ActivityRegistry;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum TransitionError {
    #[error("Cannot transition from {from} to {to}")]
    InvalidTransition {
        from: ActivityState,
        to: ActivityState,
        /// Targets the table permits from `from`
        valid: Vec<ActivityState>,
    },
}

/// Outcome of a pre-flight transition check
///
/// Advisory only: nothing is mutated. `errors` non-empty means the request
/// would be rejected; `warnings` flag conditions worth surfacing to the
/// operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TransitionValidation {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Static description of the lifecycle, for introspection endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StateMachineInfo {
    pub states: Vec<ActivityState>,
    pub transitions: BTreeMap<String, Vec<ActivityState>>,
    pub terminal_states: Vec<ActivityState>,
}

/// Activity lifecycle state machine
///
/// The transition table is fixed:
///
/// ```text
/// draft     -> published
/// published -> active | draft
/// active    -> expired
/// expired   -> (terminal)
/// ```
///
/// Transitions mutate the activity record supplied by the caller; nothing is
/// persisted here. Kind-specific transition restrictions are layered on by
/// the orchestration layer, not by this table.
pub struct ActivityStateMachine;

impl ActivityStateMachine {
    /// Valid target states from a given state
    pub fn valid_transitions(current: ActivityState) -> &'static [ActivityState] {
        match current {
            ActivityState::Draft => &[ActivityState::Published],
            ActivityState::Published => &[ActivityState::Active, ActivityState::Draft],
            ActivityState::Active => &[ActivityState::Expired],
            ActivityState::Expired => &[],
        }
    }

    /// Check table membership for a transition
    pub fn can_transition(current: ActivityState, target: ActivityState) -> bool {
        Self::valid_transitions(current).contains(&target)
    }

    /// Perform a state transition using the host clock
    pub fn transition(
        activity: &mut Activity,
        target: ActivityState,
        reason: Option<&str>,
        force: bool,
    ) -> Result<(), TransitionError> {
        Self::transition_at(activity, target, reason, force, Utc::now())
    }

    /// Perform a state transition at an explicit instant
    ///
    /// Unless `force` is set, rejects moves the table forbids. On success
    /// the activity's state and `updated_at` are written, then
    /// state-specific side effects run: entering `Active` schedules
    /// `expires_at` from the metadata duration; entering `Expired` stamps
    /// `expires_at` if it was never set.
    pub fn transition_at(
        activity: &mut Activity,
        target: ActivityState,
        reason: Option<&str>,
        force: bool,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        let old = activity.state;

        if !Self::can_transition(old, target) {
            if !force {
                tracing::warn!(
                    activity_id = %activity.id,
                    from = %old,
                    to = %target,
                    "Invalid state transition attempted"
                );
                return Err(TransitionError::InvalidTransition {
                    from: old,
                    to: target,
                    valid: Self::valid_transitions(old).to_vec(),
                });
            }
            tracing::warn!(
                activity_id = %activity.id,
                from = %old,
                to = %target,
                reason,
                "Forced transition bypassing the table"
            );
        }

        activity.state = target;
        activity.updated_at = now;

        match target {
            ActivityState::Active => Self::handle_activation(activity, now),
            ActivityState::Expired => Self::handle_expiration(activity, now),
            _ => {}
        }

        tracing::info!(
            activity_id = %activity.id,
            from = %old,
            to = %target,
            reason,
            "Activity transitioned"
        );

        Ok(())
    }

    /// Schedule expiry when a duration is configured
    fn handle_activation(activity: &mut Activity, now: DateTime<Utc>) {
        if let Some(seconds) = activity.duration_seconds().filter(|s| *s > 0) {
            let expires_at = now + Duration::seconds(seconds);
            activity.expires_at = Some(expires_at);
            tracing::info!(activity_id = %activity.id, %expires_at, "Activity will expire");
        }
    }

    /// First-observation expiry stamp
    fn handle_expiration(activity: &mut Activity, now: DateTime<Utc>) {
        if activity.expires_at.is_none() {
            activity.expires_at = Some(now);
        }
    }

    /// Expire every overdue activity in the candidate set, using the host
    /// clock
    pub fn check_expired(activities: &mut [Activity]) -> Vec<ActivityId> {
        Self::check_expired_at(activities, Utc::now())
    }

    /// Expire every overdue activity in the candidate set
    ///
    /// An activity is overdue when it is `Active` with `expires_at <= now`.
    /// Returns the ids of the activities transitioned. Intended to be driven
    /// by an external scheduler tick; there is no timer here.
    pub fn check_expired_at(activities: &mut [Activity], now: DateTime<Utc>) -> Vec<ActivityId> {
        let mut expired = Vec::new();

        for activity in activities {
            let overdue = activity.state == ActivityState::Active
                && activity.expires_at.is_some_and(|at| at <= now);
            if !overdue {
                continue;
            }

            if Self::transition_at(
                activity,
                ActivityState::Expired,
                Some("automatic expiration"),
                false,
                now,
            )
            .is_ok()
            {
                expired.push(activity.id);
            }
        }

        expired
    }

    /// Pre-flight validation of a transition request
    ///
    /// Combines the table check with activation prerequisites: entering
    /// `Active` requires the configuration to still satisfy the kind's
    /// validation, and the kind itself may veto the move.
    pub fn validate_transition_request(
        current: ActivityState,
        target: ActivityState,
        kind_id: &str,
        config: &serde_json::Value,
        registry: &ActivityRegistry,
    ) -> TransitionValidation {
        let mut errors = Vec::new();
        let warnings = Vec::new();

        if !Self::can_transition(current, target) {
            errors.push(format!("Invalid state transition: {current} -> {target}"));
            return TransitionValidation {
                valid: false,
                errors,
                warnings,
            };
        }

        match registry.create(kind_id, None, config.clone()) {
            Ok(kind) => {
                if target == ActivityState::Active && !kind.validate_config(config) {
                    errors.push(format!(
                        "Configuration does not satisfy activation requirements for kind '{kind_id}'"
                    ));
                }
                if !kind.can_transition_to(current, target) {
                    errors.push(format!(
                        "Kind '{kind_id}' does not allow transition {current} -> {target}"
                    ));
                }
            }
            Err(e) => errors.push(e.to_string()),
        }

        TransitionValidation {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    /// Describe states, the transition table and terminal states
    pub fn state_info() -> StateMachineInfo {
        let transitions = ActivityState::ALL
            .iter()
            .map(|state| {
                (
                    state.as_str().to_string(),
                    Self::valid_transitions(*state).to_vec(),
                )
            })
            .collect();

        StateMachineInfo {
            states: ActivityState::ALL.to_vec(),
            transitions,
            terminal_states: ActivityState::ALL
                .iter()
                .copied()
                .filter(|state| Self::valid_transitions(*state).is_empty())
                .collect(),
        }
    }
}

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, error, instrument};
use uuid::Uuid;

use crate::domain::{Activity, ActivityId, ActivityState, Response};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum StoreError {
    #[error("Store error: {0}")]
    Internal(String),
}

/// Persistence boundary for activities and responses
///
/// All suspension points of the framework live behind this trait; the core
/// itself never blocks on I/O. Implementations own transaction boundaries
/// for single record writes. `load_responses` returns responses in
/// submission order (ascending `created_at`).
#[async_trait]
pub trait ActivityStore: Send + Sync {
    async fn load_activity(&self, id: ActivityId) -> Result<Option<Activity>, StoreError>;

    /// Insert or update an activity record
    async fn save_activity(&self, activity: &Activity) -> Result<(), StoreError>;

    async fn load_responses(&self, activity_id: ActivityId) -> Result<Vec<Response>, StoreError>;

    async fn save_response(&self, response: &Response) -> Result<(), StoreError>;

    /// Candidates for the expiry sweep: `Active` activities with a set
    /// `expires_at`
    async fn load_expiring_activities(&self) -> Result<Vec<Activity>, StoreError>;
}

/// In-memory store, for tests and embedders without a durable backend
#[derive(Default)]
pub struct MemoryStore {
    activities: Arc<RwLock<HashMap<Uuid, Activity>>>,
    responses: Arc<RwLock<Vec<Response>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ActivityStore for MemoryStore {
    #[instrument(skip(self))]
    async fn load_activity(&self, id: ActivityId) -> Result<Option<Activity>, StoreError> {
        match self.activities.read() {
            Ok(activities) => Ok(activities.get(&id).cloned()),
            Err(e) => {
                error!(?e, "Failed to read activities");
                Err(StoreError::Internal(e.to_string()))
            }
        }
    }

    #[instrument(skip(self, activity))]
    async fn save_activity(&self, activity: &Activity) -> Result<(), StoreError> {
        debug!(activity_id = %activity.id, state = %activity.state, "Saving activity");
        match self.activities.write() {
            Ok(mut activities) => {
                activities.insert(activity.id, activity.clone());
                Ok(())
            }
            Err(e) => {
                error!(?e, "Failed to write activity");
                Err(StoreError::Internal(e.to_string()))
            }
        }
    }

    #[instrument(skip(self))]
    async fn load_responses(&self, activity_id: ActivityId) -> Result<Vec<Response>, StoreError> {
        match self.responses.read() {
            Ok(responses) => {
                let mut matching: Vec<Response> = responses
                    .iter()
                    .filter(|r| r.activity_id == activity_id)
                    .cloned()
                    .collect();
                matching.sort_by_key(|r| r.created_at);
                Ok(matching)
            }
            Err(e) => {
                error!(?e, "Failed to read responses");
                Err(StoreError::Internal(e.to_string()))
            }
        }
    }

    #[instrument(skip(self, response))]
    async fn save_response(&self, response: &Response) -> Result<(), StoreError> {
        debug!(response_id = %response.id, activity_id = %response.activity_id, "Saving response");
        match self.responses.write() {
            Ok(mut responses) => {
                responses.push(response.clone());
                Ok(())
            }
            Err(e) => {
                error!(?e, "Failed to write response");
                Err(StoreError::Internal(e.to_string()))
            }
        }
    }

    #[instrument(skip(self))]
    async fn load_expiring_activities(&self) -> Result<Vec<Activity>, StoreError> {
        match self.activities.read() {
            Ok(activities) => Ok(activities
                .values()
                .filter(|a| a.state == ActivityState::Active && a.expires_at.is_some())
                .cloned()
                .collect()),
            Err(e) => {
                error!(?e, "Failed to read activities");
                Err(StoreError::Internal(e.to_string()))
            }
        }
    }
}

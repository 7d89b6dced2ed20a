use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::domain::ActivityId;
use crate::traits::ActivityKind;

/// Constructor for a registered kind: `(optional activity id, config)` to a
/// boxed kind instance
pub type KindConstructor =
    Box<dyn Fn(Option<ActivityId>, serde_json::Value) -> Box<dyn ActivityKind> + Send + Sync>;

/// Display metadata for a registered kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct KindMetadata {
    /// Kind identifier
    pub id: String,
    /// Human-readable name
    pub name: String,
    pub description: String,
    /// Semantic version of the kind implementation
    pub version: String,
}

/// Everything the registry holds about one kind
pub struct KindDescriptor {
    constructor: KindConstructor,
    schema: serde_json::Value,
    metadata: KindMetadata,
}

impl KindDescriptor {
    pub fn schema(&self) -> &serde_json::Value {
        &self.schema
    }

    pub fn metadata(&self) -> &KindMetadata {
        &self.metadata
    }

    /// Instantiate the kind for a given activity
    pub fn instantiate(
        &self,
        activity_id: Option<ActivityId>,
        config: serde_json::Value,
    ) -> Box<dyn ActivityKind> {
        (self.constructor)(activity_id, config)
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum RegistryError {
    #[error("Unknown activity kind: {0}")]
    UnknownKind(String),

    #[error("Activity kind '{0}' is already registered")]
    DuplicateKind(String),

    #[error("Invalid activity kind registration for '{id}': {reason}")]
    InvalidKind { id: String, reason: String },
}

/// Catalog of activity kinds
///
/// Populated once at process start and read-only afterwards; shared state
/// belongs to whoever owns the value (typically behind an `Arc`), not to the
/// type. Tests build fresh registries instead of clearing a shared one.
#[derive(Default)]
pub struct ActivityRegistry {
    kinds: BTreeMap<String, KindDescriptor>,
}

impl ActivityRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an activity kind
    ///
    /// Fails with `DuplicateKind` if the id is taken (the existing
    /// registration is left untouched) and with `InvalidKind` if the
    /// constructor or schema does not satisfy the kind contract.
    pub fn register(
        &mut self,
        kind_id: &str,
        constructor: KindConstructor,
        schema: serde_json::Value,
        name: &str,
        description: &str,
        version: &str,
    ) -> Result<(), RegistryError> {
        if self.kinds.contains_key(kind_id) {
            return Err(RegistryError::DuplicateKind(kind_id.to_string()));
        }

        Self::check_contract(kind_id, &constructor, &schema)?;

        let metadata = KindMetadata {
            id: kind_id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            version: version.to_string(),
        };

        self.kinds.insert(
            kind_id.to_string(),
            KindDescriptor {
                constructor,
                schema,
                metadata,
            },
        );

        tracing::info!(kind_id, version, "Registered activity kind");
        Ok(())
    }

    /// Probe the registration before accepting it: the constructor must
    /// yield an instance answering to the registered id, and the schema must
    /// be an object schema.
    fn check_contract(
        kind_id: &str,
        constructor: &KindConstructor,
        schema: &serde_json::Value,
    ) -> Result<(), RegistryError> {
        let probe = constructor(None, serde_json::json!({}));
        if probe.kind_id() != kind_id {
            return Err(RegistryError::InvalidKind {
                id: kind_id.to_string(),
                reason: format!(
                    "constructor produces kind '{}' instead of '{}'",
                    probe.kind_id(),
                    kind_id
                ),
            });
        }

        let is_object_schema = schema
            .get("type")
            .and_then(serde_json::Value::as_str)
            .map(|t| t == "object")
            .unwrap_or(false);
        if !schema.is_object() || !is_object_schema {
            return Err(RegistryError::InvalidKind {
                id: kind_id.to_string(),
                reason: "configuration schema must be a JSON object schema".to_string(),
            });
        }

        Ok(())
    }

    /// Check whether a kind id is registered
    pub fn is_registered(&self, kind_id: &str) -> bool {
        self.kinds.contains_key(kind_id)
    }

    /// Get the full descriptor for a kind
    pub fn get(&self, kind_id: &str) -> Result<&KindDescriptor, RegistryError> {
        self.kinds
            .get(kind_id)
            .ok_or_else(|| RegistryError::UnknownKind(kind_id.to_string()))
    }

    /// Get the configuration schema for a kind
    pub fn schema_of(&self, kind_id: &str) -> Result<&serde_json::Value, RegistryError> {
        self.get(kind_id).map(KindDescriptor::schema)
    }

    /// Get the display metadata for a kind
    pub fn metadata_of(&self, kind_id: &str) -> Result<&KindMetadata, RegistryError> {
        self.get(kind_id).map(KindDescriptor::metadata)
    }

    /// Instantiate a kind for an activity
    pub fn create(
        &self,
        kind_id: &str,
        activity_id: Option<Uuid>,
        config: serde_json::Value,
    ) -> Result<Box<dyn ActivityKind>, RegistryError> {
        self.get(kind_id)
            .map(|descriptor| descriptor.instantiate(activity_id, config))
    }

    /// Metadata for every registered kind, for discovery endpoints
    pub fn list_all(&self) -> Vec<&KindMetadata> {
        self.kinds.values().map(KindDescriptor::metadata).collect()
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

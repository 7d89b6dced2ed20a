use crate::activities::{PollKind, QnaKind, WordCloudKind};
use crate::framework::{ActivityRegistry, RegistryError};

/// Register the built-in activity kinds
///
/// Called once at process start; registering into a registry that already
/// holds one of the ids fails with `DuplicateKind`.
pub fn register_builtin_kinds(registry: &mut ActivityRegistry) -> Result<(), RegistryError> {
    registry.register(
        PollKind::KIND_ID,
        Box::new(|activity_id, config| Box::new(PollKind::new(activity_id, config))),
        PollKind::config_schema(),
        "Polling",
        "Multiple choice polls and surveys where participants vote on options",
        "1.0.0",
    )?;

    registry.register(
        QnaKind::KIND_ID,
        Box::new(|activity_id, config| Box::new(QnaKind::new(activity_id, config))),
        QnaKind::config_schema(),
        "Q&A Session",
        "Question and answer sessions where participants submit and vote on questions",
        "1.0.0",
    )?;

    registry.register(
        WordCloudKind::KIND_ID,
        Box::new(|activity_id, config| Box::new(WordCloudKind::new(activity_id, config))),
        WordCloudKind::config_schema(),
        "Word Cloud",
        "Collect words and phrases from participants to create word cloud visualizations",
        "1.0.0",
    )?;

    tracing::info!(count = registry.len(), "Activity kind registration complete");
    Ok(())
}

/// A fresh registry holding the built-in kinds
pub fn builtin_registry() -> ActivityRegistry {
    let mut registry = ActivityRegistry::new();
    register_builtin_kinds(&mut registry).expect("built-in kinds register cleanly");
    registry
}

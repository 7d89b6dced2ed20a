pub mod activities;
pub mod application;
pub mod domain;
pub mod framework;
pub mod traits;

pub use activities::{PollConfig, PollKind, QnaConfig, QnaKind, WordCloudConfig, WordCloudKind};
pub use application::{
    builtin_registry, register_builtin_kinds, ActivityService, ActivityStatusReport,
    ActivityStore, ConfigValidation, CreateActivity, MemoryStore, ServiceError, StoreError,
};
pub use domain::{Activity, ActivityId, ActivityState, Response};
pub use framework::{
    ActivityRegistry, ActivityStateMachine, KindConstructor, KindDescriptor, KindMetadata,
    RegistryError, StateMachineInfo, TransitionError, TransitionValidation,
};
pub use traits::{ActivityError, ActivityKind};

pub mod registration;
pub mod service;
pub mod store;

pub use registration::{builtin_registry, register_builtin_kinds};
pub use service::{
    ActivityService, ActivityStatusReport, ConfigValidation, CreateActivity, ServiceError,
};
pub use store::{ActivityStore, MemoryStore, StoreError};

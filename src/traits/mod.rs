pub mod activity_kind;

pub use activity_kind::{ActivityError, ActivityKind};

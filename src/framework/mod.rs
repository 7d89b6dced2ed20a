pub mod registry;
pub mod state_machine;

pub use registry::{ActivityRegistry, KindConstructor, KindDescriptor, KindMetadata, RegistryError};
pub use state_machine::{
    ActivityStateMachine, StateMachineInfo, TransitionError, TransitionValidation,
};

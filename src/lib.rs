//! Core of a desktop companion: animation state machine, autonomous
//! wandering and filesystem-based coordination between pet processes.

pub mod animations;
pub mod bridge;
pub mod channel;
pub mod config;
pub mod controls;
pub mod error;
pub mod identity;
pub mod pet;
pub mod scheduler;
pub mod social;
pub mod state;
pub mod wander;

pub use error::{ChannelError, ConfigError};
pub use identity::InstanceId;
pub use pet::{Frame, Pet};
pub use state::{Directive, Facing, MovementState, PetState};

//! Error type for the scene-facing physics API.
//!
//! The velocity solver itself never fails; errors only surface where the
//! crate talks to the scene (joint creation, configuration, body indexing).

use thiserror::Error;

/// Errors reported by [`PhysicsWorld`](crate::physics::PhysicsWorld) and the joint API.
#[derive(Debug, Error)]
pub enum PhysicsError {
    /// The entity does not exist (or was despawned).
    #[error("entity does not exist")]
    NoSuchEntity,

    /// The entity exists but lacks a component the operation needs.
    #[cfg(feature = "ecs")]
    #[error(transparent)]
    MissingComponent(hecs::ComponentError),

    /// Body indices are `u16`, with the last value reserved for the dummy body.
    #[error("too many rigid bodies for one step: {count} (max {max})", max = u16::MAX - 1)]
    TooManyBodies { count: usize },

    /// A [`PhysicsConfig`](crate::physics::PhysicsConfig) field is out of range.
    #[error("invalid physics config: {0}")]
    InvalidConfig(&'static str),
}

#[cfg(feature = "ecs")]
impl From<hecs::NoSuchEntity> for PhysicsError {
    fn from(_: hecs::NoSuchEntity) -> Self {
        Self::NoSuchEntity
    }
}

#[cfg(feature = "ecs")]
impl From<hecs::ComponentError> for PhysicsError {
    fn from(err: hecs::ComponentError) -> Self {
        match err {
            hecs::ComponentError::NoSuchEntity => Self::NoSuchEntity,
            err => Self::MissingComponent(err),
        }
    }
}

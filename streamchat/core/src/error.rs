//! Error types for the streamchat client core
//!
//! Turn failures are not errors here: a rejected request or a server error
//! event ends the turn as [`crate::streaming::TurnOutcome::Errored`] and is
//! written into the transcript. These types cover the environment around the
//! turns (storage, configuration, profile validation).

use thiserror::Error;

pub use crate::backend::BackendError;
pub use crate::config::ConfigError;
pub use crate::prompt::{ProfileError, SaveError};
pub use crate::store::StoreError;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors surfaced by the client API
#[derive(Debug, Error)]
pub enum ClientError {
    /// Persistence failure
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Configuration failure
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Profile failed validation
    #[error("invalid profile: {0}")]
    Profile(#[from] ProfileError),

    /// Profile could not be saved
    #[error("failed to save profile: {0}")]
    ProfileSave(#[from] SaveError),

    /// Context key is not in the bot registry
    #[error("unknown context: {0}")]
    UnknownContext(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

//! Error types shared by the engine, the stores and the gateways.

use crate::slot::SlotId;
use thiserror::Error;

/// Errors reported by a [`SlotStore`](crate::store::SlotStore).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store evaluated the write precondition and it did not hold.
    ///
    /// `exists` tells whether the record was present when the precondition was
    /// evaluated, so callers can tell a vanished record from a changed one.
    #[error("Precondition failed for slot {id} (record exists: {exists})")]
    PreconditionFailed {
        /// Slot the write targeted.
        id: SlotId,
        /// Whether the record was present.
        exists: bool,
    },

    /// Database connection or query failure.
    #[error("Database error: {0}")]
    Database(String),

    /// A stored record could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A pagination token that was not produced by this store.
    #[error("Invalid page token")]
    InvalidPageToken,
}

/// Errors reported by the external collaborators.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// No such user.
    #[error("Unknown user: {0}")]
    UnknownUser(String),

    /// The collaborator could not be reached.
    #[error("Gateway unavailable: {0}")]
    Unavailable(String),

    /// The collaborator refused the request.
    #[error("Gateway rejected request: {0}")]
    Rejected(String),
}

/// Outcome taxonomy of every engine operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulingError {
    /// Malformed payload or a request the slot does not allow. Never mutates state.
    #[error("Invalid request: {0}")]
    Validation(String),

    /// The caller lacks ownership or the required role. Never mutates state.
    #[error("Not authorized: {0}")]
    Authorization(String),

    /// Unknown slot id.
    #[error("Slot not found: {0}")]
    NotFound(SlotId),

    /// The store rejected the write because the slot changed underneath us.
    #[error("Conflict on slot {id}: {reason}")]
    Conflict {
        /// Slot that conflicted.
        id: SlotId,
        /// Human readable reason.
        reason: String,
    },

    /// Infrastructure failure; safe for the caller to retry.
    #[error("Temporary store error: {0}")]
    TransientStore(String),
}

impl SchedulingError {
    /// Shorthand for [`SchedulingError::Validation`].
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Shorthand for [`SchedulingError::Authorization`].
    #[must_use]
    pub fn authorization(message: impl Into<String>) -> Self {
        Self::Authorization(message.into())
    }

    /// Shorthand for [`SchedulingError::Conflict`].
    #[must_use]
    pub fn conflict(id: &SlotId, reason: impl Into<String>) -> Self {
        Self::Conflict {
            id: id.clone(),
            reason: reason.into(),
        }
    }

    /// Whether re-issuing the same call may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::TransientStore(_))
    }

    /// Translate a store failure for an operation on an existing slot.
    ///
    /// A failed precondition becomes `Conflict` if the record is still there
    /// and `NotFound` if it is gone.
    #[must_use]
    pub fn from_store(error: StoreError, reason: &str) -> Self {
        match error {
            StoreError::PreconditionFailed { id, exists: true } => Self::conflict(&id, reason),
            StoreError::PreconditionFailed { id, exists: false } => Self::NotFound(id),
            StoreError::InvalidPageToken => Self::validation("page token is not valid"),
            StoreError::Database(msg) | StoreError::Serialization(msg) => {
                Self::TransientStore(msg)
            }
        }
    }

    /// Translate a store failure for a booking attempt: every failed
    /// precondition is a lost race.
    #[must_use]
    pub fn from_booking_store(error: StoreError) -> Self {
        match error {
            StoreError::PreconditionFailed { id, .. } => {
                Self::conflict(&id, "slot no longer exists or is already fully booked")
            }
            other => Self::from_store(other, "slot changed"),
        }
    }

    /// Translate a collaborator failure during identity lookup.
    #[must_use]
    pub fn from_identity(error: GatewayError) -> Self {
        match error {
            GatewayError::UnknownUser(name) => {
                Self::authorization(format!("unknown caller `{name}`"))
            }
            GatewayError::Unavailable(msg) | GatewayError::Rejected(msg) => {
                Self::TransientStore(format!("identity lookup failed: {msg}"))
            }
        }
    }
}

//! Error types and Result alias for the turfpoint settlement core

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Broad error classes for transport adapters.
///
/// Every [`Error`] variant maps onto exactly one kind via [`Error::kind`];
/// an HTTP layer would translate these to 404 / 412 / 400 / 403 / 500
/// without matching on individual variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    PreconditionFailed,
    BadRequest,
    Forbidden,
    Internal,
}

/// Main error type for the turfpoint settlement core
#[derive(Error, Debug)]
pub enum Error {
    #[error("User '{0}' not found")]
    UserNotFound(String),

    #[error("Spot {0} not found")]
    SpotNotFound(i64),

    #[error("Visit {0} not found or already closed")]
    VisitNotFound(i64),

    #[error("Quest {0} not found")]
    QuestNotFound(i64),

    #[error("Spot {0} has no points left")]
    BudgetDepleted(i64),

    #[error("Spot {0} is inactive")]
    SpotInactive(i64),

    #[error("Spot {spot_id} is shielded until {until}")]
    ShieldActive {
        spot_id: i64,
        until: DateTime<Utc>,
    },

    #[error("Already the owner of spot {0}")]
    AlreadyOwner(i64),

    #[error("Spot {0} changed hands during the update")]
    OwnershipChanged(i64),

    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: i64, available: i64 },

    #[error("Too far from spot: {distance_m:.0}m away, limit {max_m:.0}m")]
    TooFarAway { distance_m: f64, max_m: f64 },

    #[error("Quest {0} already claimed")]
    QuestAlreadyClaimed(i64),

    #[error("Quest {0} is not completed")]
    QuestNotCompleted(i64),

    #[error("User '{0}' is already registered")]
    AlreadyRegistered(String),

    #[error("Payment intent '{0}' did not succeed")]
    PaymentNotSucceeded(String),

    #[error("Payment intent '{0}' was already consumed")]
    PaymentAlreadyConsumed(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Not the owner of spot {0}")]
    NotSpotOwner(i64),

    #[error("Visit {0} belongs to another user")]
    NotVisitOwner(i64),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl Error {
    /// Classify this error into the transport-facing taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::UserNotFound(_)
            | Error::SpotNotFound(_)
            | Error::VisitNotFound(_)
            | Error::QuestNotFound(_) => ErrorKind::NotFound,

            Error::BudgetDepleted(_)
            | Error::SpotInactive(_)
            | Error::ShieldActive { .. }
            | Error::AlreadyOwner(_)
            | Error::OwnershipChanged(_) => ErrorKind::PreconditionFailed,

            Error::InsufficientFunds { .. }
            | Error::TooFarAway { .. }
            | Error::QuestAlreadyClaimed(_)
            | Error::QuestNotCompleted(_)
            | Error::AlreadyRegistered(_)
            | Error::PaymentNotSucceeded(_)
            | Error::PaymentAlreadyConsumed(_)
            | Error::InvalidData(_) => ErrorKind::BadRequest,

            Error::NotSpotOwner(_) | Error::NotVisitOwner(_) => ErrorKind::Forbidden,

            Error::DatabaseError(_) => ErrorKind::Internal,
        }
    }
}

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

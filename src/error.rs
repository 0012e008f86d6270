//! Error types for worklane.
//!
//! Most variants are contract violations: a bug in the scheduler or worker
//! loop driving a lane. The lane never corrects these. It refuses the call,
//! leaves its state untouched and reports the violation.

use chrono::TimeDelta;
use thiserror::Error;

use crate::model::{CheckoutPhase, Location};

#[derive(Debug, Error)]
pub enum Error {
    #[error("immediate work item must have zero delay, got {delay}")]
    NotImmediate { delay: TimeDelta },

    #[error("delayed work item must have a positive delay, got {delay}")]
    NotDelayed { delay: TimeDelta },

    #[error("{op} on an empty lane")]
    EmptyLane { op: &'static str },

    #[error("{op} requires location {expected}, lane is {actual}")]
    InvalidLocation {
        op: &'static str,
        expected: Location,
        actual: Location,
    },

    #[error("{op} is not allowed in checkout phase {phase}")]
    InvalidCheckout {
        op: &'static str,
        phase: CheckoutPhase,
    },

    #[error("{op} through a retired lane ticket")]
    TicketRetired { op: &'static str },

    #[error("lane already has a live ticket")]
    TicketOutstanding,

    #[error("{op} given a session opened on a different lane")]
    ForeignSession { op: &'static str },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// True for errors caused by a caller breaking the lane protocol.
    ///
    /// A retired ticket is not one: `clear` retires tickets the scheduler may
    /// still hold in its queues.
    pub fn is_contract_violation(&self) -> bool {
        !matches!(
            self,
            Error::TicketRetired { .. }
                | Error::Config(_)
                | Error::Io(_)
                | Error::Toml(_)
                | Error::Other(_)
        )
    }

    /// The lane operation that was refused, if any.
    pub fn op(&self) -> Option<&'static str> {
        match self {
            Error::NotImmediate { .. } => Some("push_immediate_work_item"),
            Error::NotDelayed { .. } => Some("push_delayed_work_item"),
            Error::TicketOutstanding => Some("register_ticket"),
            Error::EmptyLane { op }
            | Error::InvalidLocation { op, .. }
            | Error::InvalidCheckout { op, .. }
            | Error::TicketRetired { op }
            | Error::ForeignSession { op } => Some(op),
            Error::Config(_) | Error::Io(_) | Error::Toml(_) | Error::Other(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

//! Errors surfaced by the engine to its callers.
//!
//! None of these are fatal: after any rejected command the engine is left in a
//! consistent, steppable state. Division by zero is not an error at all; it
//! produces a zero result.

use thiserror::Error;

use crate::backend::reservation_station::RSKind;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SimError {
    /// No free reservation station of the required class. The request is
    /// discarded; the caller must resubmit it.
    #[error("structural hazard: no free {0} reservation station")]
    StructuralHazard(RSKind),

    /// A command was rejected at the boundary before touching engine state.
    #[error("invalid operand: {0}")]
    InvalidOperand(String),

    /// Latencies can only change before the first instruction is issued.
    #[error("latencies are read-only once instructions have been issued")]
    ConfigLocked,
}

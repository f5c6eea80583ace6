//! Policy machine error types.

use ngac_store::StoreError;
use ngac_types::{ElementKey, MachineId, PolicyElementType};
use thiserror::Error;

/// Errors raised by the policy machine.
///
/// Every variant signals a bad call site. Ordinary negative answers (no
/// privilege, no such edge, element not found) are `Ok(false)` or empty
/// collections instead.
#[derive(Debug, Error)]
pub enum NgacError {
    /// An element of the wrong kind was passed.
    #[error("expected {expected}, got {actual} '{identifier}'")]
    InvalidArgumentType {
        expected: &'static str,
        actual: PolicyElementType,
        identifier: String,
    },

    /// The element belongs to another policy machine.
    #[error("element {element} does not belong to policy machine {machine}")]
    CrossMachine {
        element: ElementKey,
        machine: MachineId,
    },

    /// A logical link was requested between elements of one machine.
    #[error("cannot link {src} to {dst}: both belong to the same policy machine")]
    SameMachine { src: ElementKey, dst: ElementKey },

    /// The kind pair is not in the assignment whitelist.
    #[error("cannot assign {src_kind} '{src}' to {dst_kind} '{dst}'")]
    InvalidAssignment {
        src: String,
        src_kind: PolicyElementType,
        dst: String,
        dst_kind: PolicyElementType,
    },

    /// The assignment would close a cycle and cycles are not tolerated.
    #[error("assigning '{src}' to '{dst}' would create a cycle")]
    AssignmentCycle { src: String, dst: String },

    /// Operation identifiers starting with `~` are reserved for prohibitions.
    #[error("operation identifier '{0}' is reserved for prohibitions")]
    InvalidOperationName(String),

    /// An element attribute failed validation.
    #[error("invalid attribute: {0}")]
    InvalidAttribute(String),

    /// A caller-supplied association filter was empty.
    #[error("association filter must not be empty")]
    EmptyAssociationSet,

    /// The storage adapter failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result type for policy machine operations.
pub type Result<T> = std::result::Result<T, NgacError>;

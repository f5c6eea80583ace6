//! # ngac-types: Policy element model
//!
//! Shared types for the NGAC policy machine:
//! - Policy elements ([`PolicyElement`], [`PolicyElementType`], [`ElementKey`])
//! - Machine identity ([`MachineId`])
//! - The assignment whitelist ([`assignment_allowed`], [`ALLOWED_ASSIGNMENTS`])
//! - Associations and privileges ([`Association`], [`Privilege`])
//! - Prohibition naming ([`Prohibition`])
//!
//! ```
//! use ngac_types::{assignment_allowed, MachineId, PolicyElement, PolicyElementType};
//!
//! let machine = MachineId::new("hospital");
//! let nurse = PolicyElement::new(PolicyElementType::User, "nurse-1", machine, Default::default())
//!     .with_attribute("ward", "cardiology");
//!
//! assert_eq!(nurse.get_str("ward"), Some("cardiology"));
//! assert!(assignment_allowed(PolicyElementType::User, PolicyElementType::UserAttribute));
//! assert!(!assignment_allowed(PolicyElementType::User, PolicyElementType::PolicyClass));
//! ```

pub mod assignment;
pub mod association;
pub mod element;
pub mod prohibition;

pub use assignment::{ALLOWED_ASSIGNMENTS, assignment_allowed};
pub use association::{Association, Privilege};
pub use element::{
    Attributes, ElementKey, MachineId, PolicyElement, PolicyElementType, UNIQUE_IDENTIFIER_KEY,
};
pub use prohibition::{PROHIBITION_PREFIX, Prohibition};

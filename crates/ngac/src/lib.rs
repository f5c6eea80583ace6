//! # ngac: Next Generation Access Control policy machine
//!
//! Attribute-based access control over a typed policy graph. Users and
//! objects are assigned to attributes, attributes to policy classes, and
//! associations grant operation sets from user attributes over object
//! attributes. Privilege queries walk that graph.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                     PolicyMachine<S>                       │
//! │  elements · assignments · links · associations · queries  │
//! ├──────────────┬───────────────────────────┬────────────────┤
//! │  BulkBuffer  │   privilege evaluation    │  transactions  │
//! │  (staged     │   (generic graph walk or  │  (checkpoint / │
//! │   writes)    │    adapter fast path)     │   restore)     │
//! ├──────────────┴───────────────────────────┴────────────────┤
//! │              PolicyStore (ngac-store)                      │
//! │      MemoryStore · custom adapters sharing machines        │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use ngac::{Attributes, PolicyMachine, PrivilegeOptions};
//!
//! let pm = PolicyMachine::in_memory();
//! let none = Attributes::new;
//!
//! let alice = pm.create_user("alice", none())?;
//! let staff = pm.create_user_attribute("staff", none())?;
//! let report = pm.create_object("report", none())?;
//! let reports = pm.create_object_attribute("reports", none())?;
//! let org = pm.create_policy_class("org", none())?;
//! let read = pm.create_operation("read", none())?;
//! let readers = pm.create_operation_set("readers", none())?;
//!
//! pm.add_assignment(&alice, &staff)?;
//! pm.add_assignment(&report, &reports)?;
//! pm.add_assignment(&reports, &org)?;
//! pm.add_assignment(&readers, &read)?;
//! pm.add_association(&staff, &readers, &reports)?;
//!
//! let opts = PrivilegeOptions::new();
//! assert!(pm.is_privilege(&alice, &read, &report, &opts)?);
//! assert!(!pm.is_privilege(&alice, "write", &report, &opts)?);
//! # Ok::<(), ngac::NgacError>(())
//! ```

mod bulk;
mod error;
mod machine;
mod privilege;

pub use bulk::{BulkBuffer, FlushSummary};
pub use error::{NgacError, Result};
pub use machine::PolicyMachine;
pub use privilege::{OperationRef, PrivilegeOptions};

pub use ngac_config::{EngineConfig, NgacConfig, StoreBackend};
pub use ngac_store::{Capabilities, MemoryStore, PolicyStore, QueryScope, StoreError};
pub use ngac_types::{
    Association, Attributes, ElementKey, MachineId, PolicyElement, PolicyElementType, Privilege,
    Prohibition,
};
pub use serde_json::Value;

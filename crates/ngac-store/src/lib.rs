//! # ngac-store: Storage adapters for the policy machine
//!
//! The [`PolicyStore`] trait is the contract every backend satisfies:
//! element persistence, assignment and link reachability, association
//! lookup, and checkpoint-based transactions. Backends that can evaluate
//! privileges natively advertise it through [`Capabilities`].
//!
//! [`MemoryStore`] is the reference implementation.
//!
//! ```
//! use ngac_store::{MemoryStore, PolicyStore};
//! use ngac_types::{MachineId, PolicyElement, PolicyElementType};
//!
//! let store = MemoryStore::new();
//! let machine = MachineId::new("pm");
//! let user = store.add_element(PolicyElement::new(
//!     PolicyElementType::User, "alice", machine.clone(), Default::default(),
//! ))?;
//! let staff = store.add_element(PolicyElement::new(
//!     PolicyElementType::UserAttribute, "staff", machine, Default::default(),
//! ))?;
//!
//! store.assign(&user.key(), &staff.key())?;
//! assert!(store.connected(&user.key(), &staff.key())?);
//! assert!(!store.connected(&staff.key(), &user.key())?);
//! # Ok::<(), ngac_store::StoreError>(())
//! ```

mod contract;
mod error;
mod memory;

pub use contract::{Capabilities, PolicyStore, QueryScope};
pub use error::{Result, StoreError};
pub use memory::{MemoryCheckpoint, MemoryStats, MemoryStore};

#[cfg(test)]
mod tests;

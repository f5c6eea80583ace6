//! The storage adapter contract.
//!
//! Every backend implements [`PolicyStore`]. The policy machine validates
//! kinds and machine membership before calling in; the adapter only checks
//! that the keys it receives name persisted elements.
//!
//! # Optional fast paths
//!
//! Backends with their own privilege evaluation (a SQL recursive query, a
//! materialized closure table, ...) advertise it through
//! [`PolicyStore::capabilities`]. The policy machine calls
//! [`is_privilege`](PolicyStore::is_privilege),
//! [`scoped_privileges`](PolicyStore::scoped_privileges) and
//! [`accessible_objects`](PolicyStore::accessible_objects) only when the
//! matching flag is set and evaluates the generic graph algorithm otherwise.

use ngac_types::{
    Association, Attributes, ElementKey, MachineId, PolicyElement, PolicyElementType, Privilege,
};
use tracing::warn;

use crate::error::{Result, StoreError};

// ============================================================================
// Capabilities
// ============================================================================

/// Optimized queries a backend implements natively.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub is_privilege: bool,
    pub scoped_privileges: bool,
    pub accessible_objects: bool,
}

impl Capabilities {
    /// No fast paths; the generic algorithm handles every query.
    pub fn none() -> Self {
        Self::default()
    }

    /// Every fast path is available.
    pub fn all() -> Self {
        Self {
            is_privilege: true,
            scoped_privileges: true,
            accessible_objects: true,
        }
    }
}

// ============================================================================
// Query scope
// ============================================================================

/// Options forwarded to an adapter fast path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryScope {
    /// Skip the prohibition check.
    pub ignore_prohibitions: bool,
    /// Evaluate as if the subject were this user attribute.
    pub in_user_attribute: Option<ElementKey>,
    /// Evaluate as if the object were this object attribute.
    pub in_object_attribute: Option<ElementKey>,
    /// `(attribute key, substring)` filter for accessible objects.
    pub attribute_filter: Option<(String, String)>,
}

// ============================================================================
// PolicyStore
// ============================================================================

/// Persistence and reachability for the policy graph.
///
/// Methods take `&self`; adapters own their concurrency control.
pub trait PolicyStore {
    /// Snapshot type used for transactional rollback.
    type Checkpoint;

    // -- Elements --

    /// Persists a new element and returns it.
    ///
    /// Fails with [`StoreError::DuplicateElement`] if the identifier is taken
    /// within the element's machine.
    fn add_element(&self, element: PolicyElement) -> Result<PolicyElement>;

    /// Looks up a persisted element.
    fn element(&self, key: &ElementKey) -> Result<Option<PolicyElement>>;

    /// Returns the elements of `kind` in `machine` matching every filter,
    /// ordered by identifier.
    fn find_all_of_type(
        &self,
        kind: PolicyElementType,
        machine: &MachineId,
        filters: &Attributes,
    ) -> Result<Vec<PolicyElement>>;

    /// Merges `attrs` into the element. Returns `false` when the key is not
    /// persisted.
    fn update(&self, key: &ElementKey, attrs: &Attributes) -> Result<bool>;

    /// Removes the element with its own assignments, links and associations.
    /// Returns `false` when nothing was removed.
    fn delete(&self, key: &ElementKey) -> Result<bool>;

    /// Whether `key` is persisted and belongs to `machine`.
    fn element_in_machine(&self, key: &ElementKey, machine: &MachineId) -> Result<bool> {
        Ok(key.machine == *machine && self.element(key)?.is_some())
    }

    // -- Assignments --

    /// Adds the edge `src -> dst`. Returns `false` if it already existed.
    fn assign(&self, src: &ElementKey, dst: &ElementKey) -> Result<bool>;

    /// Removes the edge `src -> dst`. Returns whether it existed.
    fn unassign(&self, src: &ElementKey, dst: &ElementKey) -> Result<bool>;

    /// Reflexive, directed reachability along assignment edges.
    fn connected(&self, src: &ElementKey, dst: &ElementKey) -> Result<bool>;

    /// Elements `key` is directly assigned to.
    fn children(&self, key: &ElementKey) -> Result<Vec<PolicyElement>>;

    /// Elements directly assigned to `key`.
    fn parents(&self, key: &ElementKey) -> Result<Vec<PolicyElement>>;

    /// Every element reachable from `key`, excluding `key` itself.
    fn descendants(&self, key: &ElementKey) -> Result<Vec<PolicyElement>>;

    /// Every element that reaches `key`, excluding `key` itself.
    fn ancestors(&self, key: &ElementKey) -> Result<Vec<PolicyElement>>;

    // -- Logical links --

    /// Adds the cross-machine edge `src -> dst`. Returns `false` if it
    /// already existed.
    fn link(&self, src: &ElementKey, dst: &ElementKey) -> Result<bool>;

    /// Removes the link `src -> dst`. Returns whether it existed.
    fn unlink(&self, src: &ElementKey, dst: &ElementKey) -> Result<bool>;

    /// Directed reachability along links. Never true for `src == dst`.
    fn linked(&self, src: &ElementKey, dst: &ElementKey) -> Result<bool>;

    // -- Associations --

    fn add_association(&self, association: Association) -> Result<()>;

    /// Associations whose operation set transitively contains `operation`.
    fn associations_with(&self, operation: &ElementKey) -> Result<Vec<Association>>;

    /// Policy classes reachable from an object or object attribute.
    fn policy_classes_for_object_attribute(&self, key: &ElementKey) -> Result<Vec<PolicyElement>>;

    /// User attributes reachable from a user or user attribute.
    fn user_attributes_for_user(&self, key: &ElementKey) -> Result<Vec<PolicyElement>>;

    // -- Transactions --

    /// Captures the adapter state for a later [`restore`](Self::restore).
    fn checkpoint(&self) -> Result<Self::Checkpoint> {
        Err(StoreError::Unsupported("transaction"))
    }

    /// Rolls the adapter back to a checkpoint.
    fn restore(&self, _checkpoint: Self::Checkpoint) -> Result<()> {
        Err(StoreError::Unsupported("transaction"))
    }

    /// Runs `f` all-or-nothing.
    ///
    /// If `f` returns an error, every mutation made since entry is undone
    /// and the error is returned unchanged. Adapters without checkpoint
    /// support fail with [`StoreError::Unsupported`] before `f` runs.
    fn transaction<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce() -> std::result::Result<T, E>,
        E: From<StoreError>,
    {
        let checkpoint = self.checkpoint()?;
        match f() {
            Ok(value) => Ok(value),
            Err(err) => {
                if let Err(restore_err) = self.restore(checkpoint) {
                    warn!(error = %restore_err, "transaction rollback failed");
                }
                Err(err)
            }
        }
    }

    // -- Optional fast paths --

    fn capabilities(&self) -> Capabilities {
        Capabilities::none()
    }

    /// Native privilege check. Only called when
    /// [`Capabilities::is_privilege`] is set.
    fn is_privilege(
        &self,
        _subject: &ElementKey,
        _operation: &str,
        _object: &ElementKey,
        _scope: &QueryScope,
    ) -> Result<bool> {
        Err(StoreError::Unsupported("is_privilege"))
    }

    /// Native scoped privileges. Only called when
    /// [`Capabilities::scoped_privileges`] is set.
    fn scoped_privileges(
        &self,
        _subject: &ElementKey,
        _object: &ElementKey,
        _scope: &QueryScope,
    ) -> Result<Vec<Privilege>> {
        Err(StoreError::Unsupported("scoped_privileges"))
    }

    /// Native accessible-object listing. Only called when
    /// [`Capabilities::accessible_objects`] is set.
    fn accessible_objects(
        &self,
        _subject: &ElementKey,
        _operation: &str,
        _scope: &QueryScope,
    ) -> Result<Vec<PolicyElement>> {
        Err(StoreError::Unsupported("accessible_objects"))
    }
}

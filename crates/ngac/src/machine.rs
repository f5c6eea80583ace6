//! The policy machine: element lifecycle and graph maintenance.
//!
//! A [`PolicyMachine`] is a namespace inside a shared [`PolicyStore`]. It
//! validates kinds, machine membership and the assignment whitelist before
//! anything reaches the adapter. Privilege queries live in
//! [`crate::privilege`], buffered writes in [`crate::bulk`].

use std::sync::Arc;

use ngac_config::{EngineConfig, NgacConfig, StoreBackend};
use ngac_store::{MemoryStore, PolicyStore, StoreError};
use ngac_types::{
    Association, Attributes, MachineId, PolicyElement, PolicyElementType, Prohibition,
    assignment_allowed,
};
use tracing::{debug, info, warn};

use crate::error::{NgacError, Result};

// ============================================================================
// PolicyMachine
// ============================================================================

/// A policy machine bound to a storage adapter.
///
/// Cloning is cheap and yields a handle to the same machine.
#[derive(Debug)]
pub struct PolicyMachine<S: PolicyStore> {
    uuid: MachineId,
    store: Arc<S>,
    config: EngineConfig,
}

impl<S: PolicyStore> Clone for PolicyMachine<S> {
    fn clone(&self) -> Self {
        Self {
            uuid: self.uuid.clone(),
            store: Arc::clone(&self.store),
            config: self.config,
        }
    }
}

impl PolicyMachine<MemoryStore> {
    /// A machine with a fresh uuid over its own in-memory store.
    pub fn in_memory() -> Self {
        Self::new(MachineId::generate(), Arc::new(MemoryStore::new()))
    }

    /// Opens a machine over the backend named in `config.store`.
    pub fn open(config: &NgacConfig) -> Self {
        let store = match config.store.backend {
            StoreBackend::Memory => Arc::new(MemoryStore::new()),
        };
        debug!(backend = ?config.store.backend, "store opened");
        Self::from_config(config, store)
    }
}

impl<S: PolicyStore> PolicyMachine<S> {
    pub fn new(uuid: impl Into<MachineId>, store: Arc<S>) -> Self {
        Self {
            uuid: uuid.into(),
            store,
            config: EngineConfig::default(),
        }
    }

    /// Builds a machine from loaded configuration. Generates a uuid when the
    /// configuration does not pin one.
    pub fn from_config(config: &NgacConfig, store: Arc<S>) -> Self {
        let uuid = config
            .machine
            .uuid
            .as_deref()
            .map_or_else(MachineId::generate, MachineId::new);
        info!(
            machine = %uuid,
            name = %config.machine.name,
            tolerate_cycles = config.engine.tolerate_cycles,
            "policy machine initialized"
        );
        Self::new(uuid, store).with_engine_config(config.engine)
    }

    pub fn with_engine_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn uuid(&self) -> &MachineId {
        &self.uuid
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn engine_config(&self) -> EngineConfig {
        self.config
    }

    // ------------------------------------------------------------------------
    // Elements
    // ------------------------------------------------------------------------

    /// Creates and persists an element in this machine.
    ///
    /// Operation identifiers may not start with `~`; use
    /// [`prohibition`](Self::prohibition) to obtain a negated operation.
    pub fn create_element(
        &self,
        kind: PolicyElementType,
        unique_identifier: &str,
        extra_attributes: Attributes,
    ) -> Result<PolicyElement> {
        validate_new_element(kind, unique_identifier)?;
        self.persist_element(kind, unique_identifier, extra_attributes)
    }

    pub(crate) fn persist_element(
        &self,
        kind: PolicyElementType,
        unique_identifier: &str,
        extra_attributes: Attributes,
    ) -> Result<PolicyElement> {
        let element = self.store.add_element(PolicyElement::new(
            kind,
            unique_identifier,
            self.uuid.clone(),
            extra_attributes,
        ))?;
        debug!(machine = %self.uuid, element = %element, "element created");
        Ok(element)
    }

    /// Elements of `kind` in this machine matching every filter.
    pub fn elements(
        &self,
        kind: PolicyElementType,
        filters: &Attributes,
    ) -> Result<Vec<PolicyElement>> {
        Ok(self.store.find_all_of_type(kind, &self.uuid, filters)?)
    }

    /// Looks up an element of this machine by identifier.
    pub fn find_element(&self, unique_identifier: &str) -> Result<Option<PolicyElement>> {
        Ok(self.store.element(&self.key_of(unique_identifier))?)
    }

    /// Looks up an operation (or prohibition) by name.
    pub fn find_operation(&self, name: &str) -> Result<Option<PolicyElement>> {
        Ok(self
            .find_element(name)?
            .filter(|element| element.kind() == PolicyElementType::Operation))
    }

    /// Reloads a handle from the store, picking up attribute changes made
    /// through other handles.
    pub fn refresh(&self, element: &PolicyElement) -> Result<Option<PolicyElement>> {
        self.ensure_local(element)?;
        Ok(self
            .store
            .element(&element.key())?
            .filter(|stored| stored.kind() == element.kind()))
    }

    /// Merges `attrs` into the persisted element.
    ///
    /// Returns `false` without error when the element is not persisted.
    pub fn update_element(&self, element: &PolicyElement, attrs: &Attributes) -> Result<bool> {
        self.ensure_local(element)?;
        let updated = self.store.update(&element.key(), attrs)?;
        if updated {
            debug!(element = %element, keys = attrs.len(), "element updated");
        }
        Ok(updated)
    }

    /// Deletes an element with its own edges and associations. Elements
    /// assigned to it stay in place.
    pub fn delete_element(&self, element: &PolicyElement) -> Result<bool> {
        self.ensure_local(element)?;
        let deleted = self.store.delete(&element.key())?;
        if deleted {
            debug!(machine = %self.uuid, element = %element, "element deleted");
        }
        Ok(deleted)
    }

    // ------------------------------------------------------------------------
    // Assignments
    // ------------------------------------------------------------------------

    /// Adds the assignment `src -> dst`. Returns `false` if it already
    /// existed.
    pub fn add_assignment(&self, src: &PolicyElement, dst: &PolicyElement) -> Result<bool> {
        self.check_assignment(src, dst)?;
        self.ensure_persisted(src)?;
        self.ensure_persisted(dst)?;

        if !self.config.tolerate_cycles && self.store.connected(&dst.key(), &src.key())? {
            warn!(src = %src, dst = %dst, "assignment rejected: would create a cycle");
            return Err(NgacError::AssignmentCycle {
                src: src.unique_identifier().to_string(),
                dst: dst.unique_identifier().to_string(),
            });
        }

        let added = self.store.assign(&src.key(), &dst.key())?;
        if added {
            debug!(src = %src, dst = %dst, "assignment added");
        }
        Ok(added)
    }

    pub fn remove_assignment(&self, src: &PolicyElement, dst: &PolicyElement) -> Result<bool> {
        self.ensure_local(src)?;
        self.ensure_local(dst)?;
        let removed = self.store.unassign(&src.key(), &dst.key())?;
        if removed {
            debug!(src = %src, dst = %dst, "assignment removed");
        }
        Ok(removed)
    }

    /// Reflexive, directed reachability along assignments.
    pub fn is_connected(&self, src: &PolicyElement, dst: &PolicyElement) -> Result<bool> {
        self.ensure_local(src)?;
        self.ensure_local(dst)?;
        Ok(self.store.connected(&src.key(), &dst.key())?)
    }

    pub(crate) fn check_assignment(&self, src: &PolicyElement, dst: &PolicyElement) -> Result<()> {
        self.ensure_local(src)?;
        self.ensure_local(dst)?;
        if assignment_allowed(src.kind(), dst.kind()) {
            Ok(())
        } else {
            Err(NgacError::InvalidAssignment {
                src: src.unique_identifier().to_string(),
                src_kind: src.kind(),
                dst: dst.unique_identifier().to_string(),
                dst_kind: dst.kind(),
            })
        }
    }

    // ------------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------------

    /// Elements `element` is directly assigned to.
    pub fn children(&self, element: &PolicyElement) -> Result<Vec<PolicyElement>> {
        self.ensure_persisted(element)?;
        Ok(self.store.children(&element.key())?)
    }

    /// Elements directly assigned to `element`.
    pub fn parents(&self, element: &PolicyElement) -> Result<Vec<PolicyElement>> {
        self.ensure_persisted(element)?;
        Ok(self.store.parents(&element.key())?)
    }

    pub fn descendants(&self, element: &PolicyElement) -> Result<Vec<PolicyElement>> {
        self.ensure_persisted(element)?;
        Ok(self.store.descendants(&element.key())?)
    }

    pub fn ancestors(&self, element: &PolicyElement) -> Result<Vec<PolicyElement>> {
        self.ensure_persisted(element)?;
        Ok(self.store.ancestors(&element.key())?)
    }

    // ------------------------------------------------------------------------
    // Logical links
    // ------------------------------------------------------------------------

    /// Links an element of this machine to an element of another machine
    /// sharing the store.
    pub fn add_link(&self, src: &PolicyElement, dst: &PolicyElement) -> Result<bool> {
        self.check_link(src, dst)?;
        let added = self.store.link(&src.key(), &dst.key())?;
        if added {
            debug!(src = %src.key(), dst = %dst.key(), "link added");
        }
        Ok(added)
    }

    pub fn remove_link(&self, src: &PolicyElement, dst: &PolicyElement) -> Result<bool> {
        self.check_link(src, dst)?;
        Ok(self.store.unlink(&src.key(), &dst.key())?)
    }

    /// Directed reachability along links. Never true for an element and
    /// itself.
    pub fn is_linked(&self, src: &PolicyElement, dst: &PolicyElement) -> Result<bool> {
        Ok(self.store.linked(&src.key(), &dst.key())?)
    }

    pub(crate) fn check_link(&self, src: &PolicyElement, dst: &PolicyElement) -> Result<()> {
        self.ensure_local(src)?;
        if src.policy_machine_uuid() == dst.policy_machine_uuid() {
            return Err(NgacError::SameMachine {
                src: src.key(),
                dst: dst.key(),
            });
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Associations and prohibitions
    // ------------------------------------------------------------------------

    /// Records that subjects under `user_attribute` may perform the
    /// operations in `operation_set` on objects under `object_attribute`.
    pub fn add_association(
        &self,
        user_attribute: &PolicyElement,
        operation_set: &PolicyElement,
        object_attribute: &PolicyElement,
    ) -> Result<Association> {
        let association = self.check_association(user_attribute, operation_set, object_attribute)?;
        for endpoint in [user_attribute, operation_set, object_attribute] {
            self.ensure_persisted(endpoint)?;
        }
        self.store.add_association(association.clone())?;
        debug!(association = %association, "association added");
        Ok(association)
    }

    pub(crate) fn check_association(
        &self,
        user_attribute: &PolicyElement,
        operation_set: &PolicyElement,
        object_attribute: &PolicyElement,
    ) -> Result<Association> {
        expect_kind(user_attribute, "user attribute", |k| k == PolicyElementType::UserAttribute)?;
        expect_kind(operation_set, "operation set", |k| k == PolicyElementType::OperationSet)?;
        expect_kind(object_attribute, "object attribute", PolicyElementType::is_object_attribute)?;
        for endpoint in [user_attribute, operation_set, object_attribute] {
            self.ensure_local(endpoint)?;
        }
        Ok(Association::new(
            user_attribute.key(),
            operation_set.key(),
            object_attribute.key(),
        ))
    }

    /// Associations whose operation set contains `operation`, directly or
    /// through nested operation sets.
    pub fn associations_with(&self, operation: &PolicyElement) -> Result<Vec<Association>> {
        expect_kind(operation, "operation", |k| k == PolicyElementType::Operation)?;
        self.ensure_local(operation)?;
        Ok(self.store.associations_with(&operation.key())?)
    }

    /// Returns the prohibition of `operation`, creating it on first use.
    ///
    /// Prohibitions are ordinary operations named `~<operation>`. Granting
    /// one through an association denies the original operation.
    pub fn prohibition(&self, operation: &PolicyElement) -> Result<PolicyElement> {
        expect_kind(operation, "operation", |k| k == PolicyElementType::Operation)?;
        self.ensure_persisted(operation)?;
        if operation.is_prohibition() {
            return Err(NgacError::InvalidOperationName(Prohibition::on(
                operation.unique_identifier(),
            )));
        }

        let name = Prohibition::on(operation.unique_identifier());
        if let Some(existing) = self.find_operation(&name)? {
            return Ok(existing);
        }
        self.persist_element(PolicyElementType::Operation, &name, Attributes::new())
    }

    /// User attributes reachable from `user`.
    pub fn list_user_attributes(&self, user: &PolicyElement) -> Result<Vec<PolicyElement>> {
        expect_kind(user, "user", |k| k == PolicyElementType::User)?;
        self.ensure_persisted(user)?;
        Ok(self.store.user_attributes_for_user(&user.key())?)
    }

    // ------------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------------

    /// Runs `f` all-or-nothing against the adapter.
    ///
    /// When `f` fails, every mutation it made is rolled back and its error
    /// is returned. Adapters without checkpoint support fail with
    /// [`StoreError::Unsupported`] before `f` runs.
    pub fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Self) -> Result<T>,
    {
        self.store.transaction(|| {
            f(self).inspect_err(|err| {
                warn!(machine = %self.uuid, error = %err, "transaction rolled back");
            })
        })
    }

    // ------------------------------------------------------------------------
    // Validation helpers
    // ------------------------------------------------------------------------

    pub(crate) fn key_of(&self, unique_identifier: &str) -> ngac_types::ElementKey {
        ngac_types::ElementKey::new(self.uuid.clone(), unique_identifier)
    }

    /// The element must belong to this machine.
    pub(crate) fn ensure_local(&self, element: &PolicyElement) -> Result<()> {
        if element.policy_machine_uuid() == &self.uuid {
            Ok(())
        } else {
            Err(NgacError::CrossMachine {
                element: element.key(),
                machine: self.uuid.clone(),
            })
        }
    }

    /// The element must belong to this machine and be persisted.
    pub(crate) fn ensure_persisted(&self, element: &PolicyElement) -> Result<()> {
        self.ensure_local(element)?;
        if self.store.element_in_machine(&element.key(), &self.uuid)? {
            Ok(())
        } else {
            Err(StoreError::NotPersisted(element.key()).into())
        }
    }
}

/// Rejects identifiers the caller may not create.
pub(crate) fn validate_new_element(kind: PolicyElementType, unique_identifier: &str) -> Result<()> {
    if unique_identifier.is_empty() {
        return Err(NgacError::InvalidAttribute(format!(
            "{kind} identifier must not be empty"
        )));
    }
    if kind == PolicyElementType::Operation && Prohibition::is_prohibition_name(unique_identifier) {
        return Err(NgacError::InvalidOperationName(unique_identifier.to_string()));
    }
    Ok(())
}

pub(crate) fn expect_kind(
    element: &PolicyElement,
    expected: &'static str,
    accepts: impl Fn(PolicyElementType) -> bool,
) -> Result<()> {
    if accepts(element.kind()) {
        Ok(())
    } else {
        Err(NgacError::InvalidArgumentType {
            expected,
            actual: element.kind(),
            identifier: element.unique_identifier().to_string(),
        })
    }
}

// ============================================================================
// Typed factories and listings
// ============================================================================

macro_rules! element_kind_methods {
    ($($kind:ident => $create:ident, $list:ident, $name:literal;)*) => {
        impl<S: PolicyStore> PolicyMachine<S> {
            $(
                #[doc = concat!("Creates and persists ", $name, ".")]
                pub fn $create(
                    &self,
                    unique_identifier: &str,
                    extra_attributes: Attributes,
                ) -> Result<PolicyElement> {
                    self.create_element(PolicyElementType::$kind, unique_identifier, extra_attributes)
                }

                #[doc = concat!("Lists every ", $name, " in this machine matching `filters`.")]
                pub fn $list(&self, filters: &Attributes) -> Result<Vec<PolicyElement>> {
                    self.elements(PolicyElementType::$kind, filters)
                }
            )*
        }
    };
}

element_kind_methods! {
    User => create_user, users, "a user";
    UserAttribute => create_user_attribute, user_attributes, "a user attribute";
    Object => create_object, objects, "an object";
    ObjectAttribute => create_object_attribute, object_attributes, "an object attribute";
    Operation => create_operation, operations, "an operation";
    OperationSet => create_operation_set, operation_sets, "an operation set";
    PolicyClass => create_policy_class, policy_classes, "a policy class";
}

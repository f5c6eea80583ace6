//! Privilege evaluation.
//!
//! A subject `u` holds operation `op` on object `o` when some association
//! `(ua, ops, oa)` has `op` in `ops`, `u` connected to `ua` and `o`
//! connected to `oa`. Once `o` falls under two or more policy classes, every
//! one of them must be covered by such an association whose `oa` is
//! connected to that class.
//!
//! Prohibitions invert the result: a grant of `~op` over the same triple
//! denies `op`.
//!
//! ```text
//!   u ──▶ ua ──(ops ∋ op)──▶ oa ◀── o
//!                            │
//!                            ▼
//!                           pc   (one per class when o has several)
//! ```

use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};

use ngac_store::{PolicyStore, QueryScope};
use ngac_types::{
    Association, Attributes, ElementKey, PolicyElement, PolicyElementType, Privilege, Prohibition,
};
use tracing::{debug, trace};

use crate::error::{NgacError, Result};
use crate::machine::{PolicyMachine, expect_kind};

// ============================================================================
// Operation reference
// ============================================================================

/// An operation named by handle or by identifier.
///
/// Name lookups that miss evaluate to "no privilege" rather than an error,
/// so a prohibition that was never created never denies anything.
#[derive(Debug, Clone)]
pub enum OperationRef<'a> {
    Element(&'a PolicyElement),
    Name(Cow<'a, str>),
}

impl OperationRef<'_> {
    pub fn name(&self) -> &str {
        match self {
            Self::Element(element) => element.unique_identifier(),
            Self::Name(name) => name,
        }
    }

    /// The prohibition of this operation, by name.
    pub fn prohibition(&self) -> OperationRef<'static> {
        OperationRef::Name(Cow::Owned(Prohibition::on(self.name())))
    }
}

impl<'a> From<&'a PolicyElement> for OperationRef<'a> {
    fn from(element: &'a PolicyElement) -> Self {
        Self::Element(element)
    }
}

impl<'a> From<&'a str> for OperationRef<'a> {
    fn from(name: &'a str) -> Self {
        Self::Name(Cow::Borrowed(name))
    }
}

impl From<String> for OperationRef<'static> {
    fn from(name: String) -> Self {
        Self::Name(Cow::Owned(name))
    }
}

// ============================================================================
// Query options
// ============================================================================

/// Options shared by the privilege queries.
#[derive(Debug, Clone, Default)]
pub struct PrivilegeOptions {
    /// Only consider these associations. Must not be empty.
    ///
    /// Associations whose operation set does not contain the queried
    /// operation are dropped; when none remain the answer is `false`, not an
    /// error.
    pub associations: Option<Vec<Association>>,
    /// Evaluate as if the subject were this user attribute. The subject must
    /// be connected to it or the answer is `false`.
    pub in_user_attribute: Option<PolicyElement>,
    /// Evaluate as if the object were this object attribute. The object must
    /// be connected to it or the answer is `false`.
    pub in_object_attribute: Option<PolicyElement>,
    /// Skip the prohibition check.
    pub ignore_prohibitions: bool,
    /// `(attribute key, substring)` filter for [`PolicyMachine::accessible_objects`].
    pub attribute_filter: Option<(String, String)>,
}

impl PrivilegeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_associations(mut self, associations: Vec<Association>) -> Self {
        self.associations = Some(associations);
        self
    }

    pub fn in_user_attribute(mut self, user_attribute: PolicyElement) -> Self {
        self.in_user_attribute = Some(user_attribute);
        self
    }

    pub fn in_object_attribute(mut self, object_attribute: PolicyElement) -> Self {
        self.in_object_attribute = Some(object_attribute);
        self
    }

    pub fn ignoring_prohibitions(mut self) -> Self {
        self.ignore_prohibitions = true;
        self
    }

    pub fn with_attribute_filter(
        mut self,
        key: impl Into<String>,
        needle: impl Into<String>,
    ) -> Self {
        self.attribute_filter = Some((key.into(), needle.into()));
        self
    }

    fn scope(&self) -> QueryScope {
        QueryScope {
            ignore_prohibitions: self.ignore_prohibitions,
            in_user_attribute: self.in_user_attribute.as_ref().map(PolicyElement::key),
            in_object_attribute: self.in_object_attribute.as_ref().map(PolicyElement::key),
            attribute_filter: self.attribute_filter.clone(),
        }
    }
}

// ============================================================================
// Queries
// ============================================================================

impl<S: PolicyStore> PolicyMachine<S> {
    /// Whether `subject` may perform `operation` on `object`, prohibitions
    /// included.
    ///
    /// Equivalent to granting `operation` while not granting its
    /// prohibition. An unknown operation name yields `false`.
    pub fn is_privilege<'op>(
        &self,
        subject: &PolicyElement,
        operation: impl Into<OperationRef<'op>>,
        object: &PolicyElement,
        options: &PrivilegeOptions,
    ) -> Result<bool> {
        let operation = operation.into();
        self.check_subject(subject)?;
        self.check_object(object)?;
        self.check_options(options)?;
        let Some(resolved) = self.resolve_operation(&operation)? else {
            return Ok(false);
        };

        if self.use_fast_path(self.store().capabilities().is_privilege, options) {
            trace!(
                subject = %subject,
                operation = %resolved,
                object = %object,
                "adapter is_privilege"
            );
            return Ok(self.store().is_privilege(
                &subject.key(),
                resolved.unique_identifier(),
                &object.key(),
                &options.scope(),
            )?);
        }

        if !self.grants(subject, &resolved, object, options)? {
            return Ok(false);
        }
        if options.ignore_prohibitions {
            return Ok(true);
        }
        let prohibition = operation.prohibition();
        let denied =
            self.is_privilege_ignoring_prohibitions(subject, prohibition, object, options)?;
        Ok(!denied)
    }

    /// The grant half of [`is_privilege`](Self::is_privilege): prohibitions
    /// are not consulted.
    pub fn is_privilege_ignoring_prohibitions<'op>(
        &self,
        subject: &PolicyElement,
        operation: impl Into<OperationRef<'op>>,
        object: &PolicyElement,
        options: &PrivilegeOptions,
    ) -> Result<bool> {
        let operation = operation.into();
        self.check_subject(subject)?;
        self.check_object(object)?;
        self.check_options(options)?;
        match self.resolve_operation(&operation)? {
            Some(resolved) => self.grants(subject, &resolved, object, options),
            None => Ok(false),
        }
    }

    /// Every privilege `subject` holds on `object`, one per operation.
    ///
    /// Prohibitions are never listed themselves; unless
    /// `ignore_prohibitions` is set they remove the operation they negate.
    pub fn scoped_privileges(
        &self,
        subject: &PolicyElement,
        object: &PolicyElement,
        options: &PrivilegeOptions,
    ) -> Result<Vec<Privilege>> {
        self.check_subject(subject)?;
        self.check_object(object)?;
        self.check_options(options)?;

        if self.use_fast_path(self.store().capabilities().scoped_privileges, options) {
            trace!(subject = %subject, object = %object, "adapter scoped_privileges");
            return Ok(self
                .store()
                .scoped_privileges(&subject.key(), &object.key(), &options.scope())?);
        }

        let mut granted = Vec::new();
        let mut denied = BTreeSet::new();
        for operation in self.operations(&Attributes::new())? {
            if !self.grants(subject, &operation, object, options)? {
                continue;
            }
            match Prohibition::negated_operation(operation.unique_identifier()) {
                Some(negated) => {
                    denied.insert(negated.to_string());
                }
                None => granted.push(operation),
            }
        }
        if !options.ignore_prohibitions {
            granted.retain(|op| !denied.contains(op.unique_identifier()));
        }

        debug!(
            subject = %subject,
            object = %object,
            granted = granted.len(),
            denied = denied.len(),
            "scoped privileges evaluated"
        );
        Ok(granted
            .into_iter()
            .map(|op| Privilege::new(subject.clone(), op, object.clone()))
            .collect())
    }

    /// Identifiers of the operations `subject` may perform on `object`.
    pub fn accessible_operations(
        &self,
        subject: &PolicyElement,
        object: &PolicyElement,
        options: &PrivilegeOptions,
    ) -> Result<Vec<String>> {
        Ok(self
            .scoped_privileges(subject, object, options)?
            .into_iter()
            .map(|privilege| privilege.operation.unique_identifier().to_string())
            .collect())
    }

    /// Objects on which `subject` holds `operation`, ordered by identifier.
    ///
    /// Candidates are objects reachable (inclusively) from the object
    /// attributes of associations granting `operation` to a user attribute
    /// of `subject`. An `attribute_filter` keeps candidates whose attribute
    /// value contains the needle.
    pub fn accessible_objects<'op>(
        &self,
        subject: &PolicyElement,
        operation: impl Into<OperationRef<'op>>,
        options: &PrivilegeOptions,
    ) -> Result<Vec<PolicyElement>> {
        let operation = operation.into();
        self.check_subject(subject)?;
        self.check_options(options)?;
        let Some(resolved) = self.resolve_operation(&operation)? else {
            return Ok(Vec::new());
        };

        if self.use_fast_path(self.store().capabilities().accessible_objects, options) {
            trace!(subject = %subject, operation = %resolved, "adapter accessible_objects");
            return Ok(self.store().accessible_objects(
                &subject.key(),
                resolved.unique_identifier(),
                &options.scope(),
            )?);
        }

        let subject_key = subject.key();
        let mut candidates: BTreeMap<String, PolicyElement> = BTreeMap::new();
        for association in self.candidate_associations(&resolved, options)? {
            if !self.store().connected(&subject_key, &association.user_attribute)? {
                continue;
            }
            let Some(root) = self.store().element(&association.object_attribute)? else {
                continue;
            };
            let below = self.store().ancestors(&association.object_attribute)?;
            for element in std::iter::once(root).chain(below) {
                if element.kind() == PolicyElementType::Object {
                    candidates.insert(element.unique_identifier().to_string(), element);
                }
            }
        }

        if let Some((key, needle)) = &options.attribute_filter {
            candidates.retain(|_, object| {
                object
                    .searchable_value(key)
                    .is_some_and(|value| value.contains(needle.as_str()))
            });
        }

        let mut accessible = Vec::with_capacity(candidates.len());
        for object in candidates.into_values() {
            if self.is_privilege(subject, OperationRef::Element(&resolved), &object, options)? {
                accessible.push(object);
            }
        }
        debug!(
            subject = %subject,
            operation = %resolved,
            count = accessible.len(),
            "accessible objects evaluated"
        );
        Ok(accessible)
    }

    /// Every `(user, operation, object)` privilege in this machine.
    pub fn privileges(&self) -> Result<Vec<Privilege>> {
        let users = self.users(&Attributes::new())?;
        let objects = self.objects(&Attributes::new())?;
        let options = PrivilegeOptions::default();

        let mut all = Vec::new();
        for user in &users {
            for object in &objects {
                all.extend(self.scoped_privileges(user, object, &options)?);
            }
        }
        Ok(all)
    }

    // ------------------------------------------------------------------------
    // Generic evaluation
    // ------------------------------------------------------------------------

    /// Grant check for an already resolved operation.
    fn grants(
        &self,
        subject: &PolicyElement,
        operation: &PolicyElement,
        object: &PolicyElement,
        options: &PrivilegeOptions,
    ) -> Result<bool> {
        let associations = self.candidate_associations(operation, options)?;
        if associations.is_empty() {
            return Ok(false);
        }

        let mut subject_key = subject.key();
        if let Some(ua) = &options.in_user_attribute {
            if !self.store().connected(&subject_key, &ua.key())? {
                return Ok(false);
            }
            subject_key = ua.key();
        }

        let mut object_key = object.key();
        if let Some(oa) = &options.in_object_attribute {
            if !self.store().connected(&object_key, &oa.key())? {
                return Ok(false);
            }
            object_key = oa.key();
        }

        let policy_classes = self.store().policy_classes_for_object_attribute(&object_key)?;
        let granted = if policy_classes.len() < 2 {
            self.justified(&subject_key, &object_key, &associations, None)?
        } else {
            let mut every_class = true;
            for pc in &policy_classes {
                if !self.justified(&subject_key, &object_key, &associations, Some(&pc.key()))? {
                    every_class = false;
                    break;
                }
            }
            every_class
        };

        trace!(
            subject = %subject,
            operation = %operation,
            object = %object,
            policy_classes = policy_classes.len(),
            granted,
            "grant evaluated"
        );
        Ok(granted)
    }

    /// Whether one association connects subject and object, and, when a
    /// policy class is given, has its object attribute under that class.
    fn justified(
        &self,
        subject: &ElementKey,
        object: &ElementKey,
        associations: &[Association],
        policy_class: Option<&ElementKey>,
    ) -> Result<bool> {
        for association in associations {
            if let Some(pc) = policy_class
                && !self.store().connected(&association.object_attribute, pc)?
            {
                continue;
            }
            if self.store().connected(subject, &association.user_attribute)?
                && self.store().connected(object, &association.object_attribute)?
            {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Associations containing `operation`, narrowed to the caller's filter
    /// when one is given.
    fn candidate_associations(
        &self,
        operation: &PolicyElement,
        options: &PrivilegeOptions,
    ) -> Result<Vec<Association>> {
        let containing = self.store().associations_with(&operation.key())?;
        let Some(given) = &options.associations else {
            return Ok(containing);
        };
        Ok(given
            .iter()
            .filter(|a| containing.contains(a))
            .cloned()
            .collect())
    }

    fn resolve_operation(&self, operation: &OperationRef<'_>) -> Result<Option<PolicyElement>> {
        match operation {
            OperationRef::Element(element) => {
                expect_kind(element, "operation", |k| k == PolicyElementType::Operation)?;
                self.ensure_persisted(element)?;
                Ok(self.store().element(&element.key())?)
            }
            OperationRef::Name(name) => self.find_operation(name),
        }
    }

    fn use_fast_path(&self, advertised: bool, options: &PrivilegeOptions) -> bool {
        advertised && self.engine_config().prefer_adapter_fast_paths && options.associations.is_none()
    }

    fn check_subject(&self, subject: &PolicyElement) -> Result<()> {
        expect_kind(subject, "user or user attribute", PolicyElementType::is_subject)?;
        self.ensure_persisted(subject)
    }

    fn check_object(&self, object: &PolicyElement) -> Result<()> {
        expect_kind(object, "object or object attribute", PolicyElementType::is_object_attribute)?;
        self.ensure_persisted(object)
    }

    /// Validates scope elements and the association filter up front.
    fn check_options(&self, options: &PrivilegeOptions) -> Result<()> {
        if let Some(ua) = &options.in_user_attribute {
            expect_kind(ua, "user attribute", |k| k == PolicyElementType::UserAttribute)?;
            self.ensure_persisted(ua)?;
        }
        if let Some(oa) = &options.in_object_attribute {
            expect_kind(oa, "object attribute", PolicyElementType::is_object_attribute)?;
            self.ensure_persisted(oa)?;
        }
        if let Some(given) = &options.associations {
            if given.is_empty() {
                return Err(NgacError::EmptyAssociationSet);
            }
            if let Some(foreign) = given.iter().find(|a| !a.in_machine(self.uuid())) {
                return Err(NgacError::CrossMachine {
                    element: foreign.user_attribute.clone(),
                    machine: self.uuid().clone(),
                });
            }
        }
        Ok(())
    }
}

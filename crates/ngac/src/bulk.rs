//! Buffered bulk writes.
//!
//! A [`BulkBuffer`] stages element and edge changes in memory and applies
//! them in one ordered flush:
//!
//! 1. element deletions
//! 2. assignment removals
//! 3. link removals
//! 4. element upserts
//! 5. assignment additions
//! 6. link additions
//! 7. association additions
//!
//! Staged changes to the same element or edge supersede each other, so
//! creating and then deleting an element inside one buffer touches the
//! store only if the element already existed.

use std::collections::BTreeMap;

use ngac_store::{PolicyStore, StoreError};
use ngac_types::{Association, Attributes, ElementKey, PolicyElement, PolicyElementType};
use tracing::{debug, info};

use crate::error::Result;
use crate::machine::{PolicyMachine, validate_new_element};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EdgeChange {
    Add,
    Remove,
}

#[derive(Debug, Clone)]
struct StagedEdge {
    change: EdgeChange,
    src: PolicyElement,
    dst: PolicyElement,
}

type EdgeKey = (ElementKey, ElementKey);

/// Counts of what a flush applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushSummary {
    pub deleted: usize,
    pub assignments_removed: usize,
    pub links_removed: usize,
    pub upserted: usize,
    pub assignments_added: usize,
    pub links_added: usize,
    pub associations_added: usize,
}

impl FlushSummary {
    /// Whether the flush wrote nothing.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Staging area for bulk writes against one policy machine.
///
/// Reads made through the machine while a buffer is open see the store, not
/// the staged changes.
#[derive(Debug)]
pub struct BulkBuffer<'pm, S: PolicyStore> {
    machine: &'pm PolicyMachine<S>,
    upserts: BTreeMap<String, PolicyElement>,
    deletes: BTreeMap<String, PolicyElement>,
    assignments: BTreeMap<EdgeKey, StagedEdge>,
    links: BTreeMap<EdgeKey, StagedEdge>,
    associations: Vec<Association>,
}

impl<'pm, S: PolicyStore> BulkBuffer<'pm, S> {
    pub fn new(machine: &'pm PolicyMachine<S>) -> Self {
        Self {
            machine,
            upserts: BTreeMap::new(),
            deletes: BTreeMap::new(),
            assignments: BTreeMap::new(),
            links: BTreeMap::new(),
            associations: Vec::new(),
        }
    }

    pub fn machine(&self) -> &'pm PolicyMachine<S> {
        self.machine
    }

    /// Number of staged changes.
    pub fn len(&self) -> usize {
        self.upserts.len()
            + self.deletes.len()
            + self.assignments.len()
            + self.links.len()
            + self.associations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ------------------------------------------------------------------------
    // Elements
    // ------------------------------------------------------------------------

    /// Stages the creation of an element and returns its handle.
    ///
    /// If an element of the same kind and identifier is already persisted
    /// and not staged for deletion, the call becomes an attribute update.
    pub fn create(
        &mut self,
        kind: PolicyElementType,
        unique_identifier: &str,
        extra_attributes: Attributes,
    ) -> Result<PolicyElement> {
        validate_new_element(kind, unique_identifier)?;

        if let Some(staged) = self.upserts.get_mut(unique_identifier) {
            if staged.kind() != kind {
                return Err(StoreError::DuplicateElement(staged.key()).into());
            }
            staged.merge_attributes(&extra_attributes);
            return Ok(staged.clone());
        }

        let mut element = PolicyElement::new(
            kind,
            unique_identifier,
            self.machine.uuid().clone(),
            Attributes::new(),
        );
        if !self.deletes.contains_key(unique_identifier)
            && let Some(existing) = self.machine.find_element(unique_identifier)?
        {
            if existing.kind() != kind {
                return Err(StoreError::DuplicateElement(existing.key()).into());
            }
            element = existing;
        }
        element.merge_attributes(&extra_attributes);
        self.upserts.insert(unique_identifier.to_string(), element.clone());
        Ok(element)
    }

    /// Stages an attribute merge. Returns `false` when the element is
    /// neither staged nor persisted.
    pub fn update(&mut self, element: &PolicyElement, attrs: &Attributes) -> Result<bool> {
        self.machine.ensure_local(element)?;
        let id = element.unique_identifier();
        if let Some(staged) = self.upserts.get_mut(id) {
            staged.merge_attributes(attrs);
            return Ok(true);
        }
        if self.deletes.contains_key(id) {
            return Ok(false);
        }
        match self.machine.refresh(element)? {
            Some(mut current) => {
                current.merge_attributes(attrs);
                self.upserts.insert(id.to_string(), current);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Stages a deletion, dropping staged edges and associations that
    /// touch the element.
    pub fn delete(&mut self, element: &PolicyElement) -> Result<()> {
        self.machine.ensure_local(element)?;
        let id = element.unique_identifier();
        let key = element.key();

        self.upserts.remove(id);
        self.assignments.retain(|(src, dst), _| *src != key && *dst != key);
        self.links.retain(|(src, dst), _| *src != key && *dst != key);
        self.associations.retain(|a| !a.references(&key));

        if self.machine.refresh(element)?.is_some() {
            self.deletes.insert(id.to_string(), element.clone());
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Edges
    // ------------------------------------------------------------------------

    pub fn assign(&mut self, src: &PolicyElement, dst: &PolicyElement) -> Result<()> {
        self.machine.check_assignment(src, dst)?;
        self.ensure_available(src)?;
        self.ensure_available(dst)?;
        self.assignments.insert((src.key(), dst.key()), staged(EdgeChange::Add, src, dst));
        Ok(())
    }

    pub fn unassign(&mut self, src: &PolicyElement, dst: &PolicyElement) -> Result<()> {
        self.machine.ensure_local(src)?;
        self.machine.ensure_local(dst)?;
        self.assignments.insert((src.key(), dst.key()), staged(EdgeChange::Remove, src, dst));
        Ok(())
    }

    pub fn link(&mut self, src: &PolicyElement, dst: &PolicyElement) -> Result<()> {
        self.machine.check_link(src, dst)?;
        self.ensure_available(src)?;
        // A foreign endpoint cannot be staged here, so it must already exist.
        if self.machine.store().element(&dst.key())?.is_none() {
            return Err(StoreError::NotPersisted(dst.key()).into());
        }
        self.links.insert((src.key(), dst.key()), staged(EdgeChange::Add, src, dst));
        Ok(())
    }

    pub fn unlink(&mut self, src: &PolicyElement, dst: &PolicyElement) -> Result<()> {
        self.machine.check_link(src, dst)?;
        self.links.insert((src.key(), dst.key()), staged(EdgeChange::Remove, src, dst));
        Ok(())
    }

    pub fn associate(
        &mut self,
        user_attribute: &PolicyElement,
        operation_set: &PolicyElement,
        object_attribute: &PolicyElement,
    ) -> Result<Association> {
        let association =
            self.machine
                .check_association(user_attribute, operation_set, object_attribute)?;
        for endpoint in [user_attribute, operation_set, object_attribute] {
            self.ensure_available(endpoint)?;
        }
        self.associations.push(association.clone());
        Ok(association)
    }

    /// The element must be staged for creation, or persisted and not
    /// staged for deletion.
    fn ensure_available(&self, element: &PolicyElement) -> Result<()> {
        let id = element.unique_identifier();
        if self.upserts.contains_key(id) {
            return Ok(());
        }
        if !self.deletes.contains_key(id) && self.machine.refresh(element)?.is_some() {
            return Ok(());
        }
        Err(StoreError::NotPersisted(element.key()).into())
    }

    // ------------------------------------------------------------------------
    // Flush
    // ------------------------------------------------------------------------

    /// Applies every staged change in phase order.
    ///
    /// A failure stops the flush where it happened; run it inside
    /// [`PolicyMachine::transaction`] for all-or-nothing semantics.
    pub fn flush(self) -> Result<FlushSummary> {
        let pm = self.machine;
        let store = pm.store();
        let mut summary = FlushSummary::default();

        for element in self.deletes.values() {
            if pm.delete_element(element)? {
                summary.deleted += 1;
            }
        }

        let (assignment_adds, assignment_removes) = partition(self.assignments);
        for edge in &assignment_removes {
            if endpoints_persisted(pm, edge)? && pm.remove_assignment(&edge.src, &edge.dst)? {
                summary.assignments_removed += 1;
            }
        }

        let (link_adds, link_removes) = partition(self.links);
        for edge in &link_removes {
            if endpoints_persisted(pm, edge)? && pm.remove_link(&edge.src, &edge.dst)? {
                summary.links_removed += 1;
            }
        }

        for element in self.upserts.into_values() {
            let key = element.key();
            if !store.update(&key, element.extra_attributes())? {
                store.add_element(element)?;
            }
            summary.upserted += 1;
        }

        for edge in &assignment_adds {
            if pm.add_assignment(&edge.src, &edge.dst)? {
                summary.assignments_added += 1;
            }
        }

        for edge in &link_adds {
            if pm.add_link(&edge.src, &edge.dst)? {
                summary.links_added += 1;
            }
        }

        for association in self.associations {
            store.add_association(association)?;
            summary.associations_added += 1;
        }

        debug!(machine = %pm.uuid(), ?summary, "bulk buffer flushed");
        Ok(summary)
    }
}

fn staged(change: EdgeChange, src: &PolicyElement, dst: &PolicyElement) -> StagedEdge {
    StagedEdge {
        change,
        src: src.clone(),
        dst: dst.clone(),
    }
}

fn partition(edges: BTreeMap<EdgeKey, StagedEdge>) -> (Vec<StagedEdge>, Vec<StagedEdge>) {
    edges
        .into_values()
        .partition(|edge| edge.change == EdgeChange::Add)
}

/// An edge can only exist between persisted endpoints; removals of anything
/// else are skipped.
fn endpoints_persisted<S: PolicyStore>(pm: &PolicyMachine<S>, edge: &StagedEdge) -> Result<bool> {
    let store = pm.store();
    Ok(store.element(&edge.src.key())?.is_some() && store.element(&edge.dst.key())?.is_some())
}

// ============================================================================
// PolicyMachine entry points
// ============================================================================

impl<S: PolicyStore> PolicyMachine<S> {
    /// Opens an empty buffer. Nothing reaches the store until
    /// [`BulkBuffer::flush`].
    pub fn bulk_buffer(&self) -> BulkBuffer<'_, S> {
        BulkBuffer::new(self)
    }

    /// Runs `f` against a fresh buffer and flushes it.
    ///
    /// If `f` fails the buffer is discarded and the store is untouched.
    pub fn bulk_persist<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut BulkBuffer<'_, S>) -> Result<T>,
    {
        let mut buffer = self.bulk_buffer();
        let value = f(&mut buffer)?;
        let staged = buffer.len();
        let summary = buffer.flush()?;
        info!(
            machine = %self.uuid(),
            staged,
            deleted = summary.deleted,
            upserted = summary.upserted,
            assignments_added = summary.assignments_added,
            associations_added = summary.associations_added,
            "bulk persist completed"
        );
        Ok(value)
    }
}

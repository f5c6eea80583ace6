//! In-memory reference adapter.
//!
//! Keeps the whole graph in ordered maps behind a single `RwLock`. Reachability
//! is a breadth-first search with a visited set, so cyclic graphs terminate.
//! Transactions snapshot the graph and restore it on error.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use ngac_types::{
    Association, Attributes, ElementKey, MachineId, PolicyElement, PolicyElementType,
};
use tracing::debug;

use crate::contract::PolicyStore;
use crate::error::{Result, StoreError};

type Edges = BTreeMap<ElementKey, BTreeSet<ElementKey>>;

/// Graph state guarded by the store lock.
#[derive(Debug, Clone, Default)]
struct Graph {
    elements: BTreeMap<ElementKey, PolicyElement>,
    /// `src -> {dst}` for assignments.
    assignments: Edges,
    /// `dst -> {src}` for assignments.
    assigned_from: Edges,
    /// `src -> {dst}` for logical links.
    links: Edges,
    /// `dst -> {src}` for logical links.
    linked_from: Edges,
    associations: Vec<Association>,
}

impl Graph {
    fn require(&self, key: &ElementKey) -> Result<()> {
        if self.elements.contains_key(key) {
            Ok(())
        } else {
            Err(StoreError::NotPersisted(key.clone()))
        }
    }

    fn resolve<'a>(&self, keys: impl IntoIterator<Item = &'a ElementKey>) -> Vec<PolicyElement> {
        keys.into_iter()
            .filter_map(|k| self.elements.get(k).cloned())
            .collect()
    }

    fn edge_count(edges: &Edges) -> usize {
        edges.values().map(BTreeSet::len).sum()
    }
}

/// Inserts `src -> dst` into a forward/reverse map pair.
fn insert_edge(
    forward: &mut Edges,
    reverse: &mut Edges,
    src: &ElementKey,
    dst: &ElementKey,
) -> bool {
    let added = forward.entry(src.clone()).or_default().insert(dst.clone());
    reverse.entry(dst.clone()).or_default().insert(src.clone());
    added
}

/// Removes `src -> dst` from a forward/reverse map pair.
fn remove_edge(
    forward: &mut Edges,
    reverse: &mut Edges,
    src: &ElementKey,
    dst: &ElementKey,
) -> bool {
    let removed = forward.get_mut(src).is_some_and(|dsts| dsts.remove(dst));
    if let Some(srcs) = reverse.get_mut(dst) {
        srcs.remove(src);
    }
    removed
}

/// Drops every edge touching `key` from a forward/reverse map pair.
fn detach(forward: &mut Edges, reverse: &mut Edges, key: &ElementKey) {
    if let Some(dsts) = forward.remove(key) {
        for dst in dsts {
            if let Some(srcs) = reverse.get_mut(&dst) {
                srcs.remove(key);
            }
        }
    }
    if let Some(srcs) = reverse.remove(key) {
        for src in srcs {
            if let Some(dsts) = forward.get_mut(&src) {
                dsts.remove(key);
            }
        }
    }
}

/// Every key reachable from `start` along `edges`, excluding `start` unless
/// a cycle leads back to it.
fn reachable(edges: &Edges, start: &ElementKey) -> BTreeSet<ElementKey> {
    let mut visited = BTreeSet::new();
    let mut queue: VecDeque<&ElementKey> = VecDeque::new();
    queue.push_back(start);
    while let Some(current) = queue.pop_front() {
        if let Some(next) = edges.get(current) {
            for key in next {
                if visited.insert(key.clone()) {
                    queue.push_back(key);
                }
            }
        }
    }
    visited
}

/// Breadth-first search that stops at `target`.
fn reaches(edges: &Edges, start: &ElementKey, target: &ElementKey) -> bool {
    let mut visited: BTreeSet<&ElementKey> = BTreeSet::new();
    let mut queue: VecDeque<&ElementKey> = VecDeque::new();
    queue.push_back(start);
    while let Some(current) = queue.pop_front() {
        let Some(next) = edges.get(current) else {
            continue;
        };
        for key in next {
            if key == target {
                return true;
            }
            if visited.insert(key) {
                queue.push_back(key);
            }
        }
    }
    false
}

// ============================================================================
// MemoryStore
// ============================================================================

/// Element and edge counts, for tests and benchmarks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    pub elements: usize,
    pub assignments: usize,
    pub links: usize,
    pub associations: usize,
}

/// Snapshot of a [`MemoryStore`] taken by [`PolicyStore::checkpoint`].
#[derive(Debug, Clone)]
pub struct MemoryCheckpoint(Graph);

/// Dependency-free adapter holding the graph in memory.
///
/// `MemoryStore` is the default backend and the baseline other adapters are
/// checked against.
#[derive(Debug, Default)]
pub struct MemoryStore {
    graph: RwLock<Graph>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns element and edge counts across all machines.
    pub fn stats(&self) -> Result<MemoryStats> {
        let graph = self.read()?;
        Ok(MemoryStats {
            elements: graph.elements.len(),
            assignments: Graph::edge_count(&graph.assignments),
            links: Graph::edge_count(&graph.links),
            associations: graph.associations.len(),
        })
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Graph>> {
        self.graph.read().map_err(|_| StoreError::LockPoisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Graph>> {
        self.graph.write().map_err(|_| StoreError::LockPoisoned)
    }

    fn reachable_of_kind(
        &self,
        key: &ElementKey,
        kind: PolicyElementType,
    ) -> Result<Vec<PolicyElement>> {
        let graph = self.read()?;
        graph.require(key)?;
        let found = reachable(&graph.assignments, key);
        Ok(graph
            .resolve(&found)
            .into_iter()
            .filter(|e| e.kind() == kind)
            .collect())
    }
}

impl PolicyStore for MemoryStore {
    type Checkpoint = MemoryCheckpoint;

    fn add_element(&self, element: PolicyElement) -> Result<PolicyElement> {
        let mut graph = self.write()?;
        let key = element.key();
        if graph.elements.contains_key(&key) {
            return Err(StoreError::DuplicateElement(key));
        }
        graph.elements.insert(key, element.clone());
        Ok(element)
    }

    fn element(&self, key: &ElementKey) -> Result<Option<PolicyElement>> {
        Ok(self.read()?.elements.get(key).cloned())
    }

    fn find_all_of_type(
        &self,
        kind: PolicyElementType,
        machine: &MachineId,
        filters: &Attributes,
    ) -> Result<Vec<PolicyElement>> {
        let graph = self.read()?;
        Ok(graph
            .elements
            .values()
            .filter(|e| e.kind() == kind && e.policy_machine_uuid() == machine)
            .filter(|e| e.matches(filters))
            .cloned()
            .collect())
    }

    fn update(&self, key: &ElementKey, attrs: &Attributes) -> Result<bool> {
        let mut graph = self.write()?;
        match graph.elements.get_mut(key) {
            Some(element) => {
                element.merge_attributes(attrs);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn delete(&self, key: &ElementKey) -> Result<bool> {
        let mut graph = self.write()?;
        if graph.elements.remove(key).is_none() {
            return Ok(false);
        }
        let Graph {
            assignments,
            assigned_from,
            links,
            linked_from,
            associations,
            ..
        } = &mut *graph;
        detach(assignments, assigned_from, key);
        detach(links, linked_from, key);
        associations.retain(|a| !a.references(key));
        debug!(element = %key, "element deleted");
        Ok(true)
    }

    fn assign(&self, src: &ElementKey, dst: &ElementKey) -> Result<bool> {
        let mut graph = self.write()?;
        graph.require(src)?;
        graph.require(dst)?;
        let Graph {
            assignments,
            assigned_from,
            ..
        } = &mut *graph;
        Ok(insert_edge(assignments, assigned_from, src, dst))
    }

    fn unassign(&self, src: &ElementKey, dst: &ElementKey) -> Result<bool> {
        let mut graph = self.write()?;
        graph.require(src)?;
        graph.require(dst)?;
        let Graph {
            assignments,
            assigned_from,
            ..
        } = &mut *graph;
        Ok(remove_edge(assignments, assigned_from, src, dst))
    }

    fn connected(&self, src: &ElementKey, dst: &ElementKey) -> Result<bool> {
        let graph = self.read()?;
        graph.require(src)?;
        graph.require(dst)?;
        Ok(src == dst || reaches(&graph.assignments, src, dst))
    }

    fn children(&self, key: &ElementKey) -> Result<Vec<PolicyElement>> {
        let graph = self.read()?;
        graph.require(key)?;
        Ok(graph
            .assignments
            .get(key)
            .map(|dsts| graph.resolve(dsts))
            .unwrap_or_default())
    }

    fn parents(&self, key: &ElementKey) -> Result<Vec<PolicyElement>> {
        let graph = self.read()?;
        graph.require(key)?;
        Ok(graph
            .assigned_from
            .get(key)
            .map(|srcs| graph.resolve(srcs))
            .unwrap_or_default())
    }

    fn descendants(&self, key: &ElementKey) -> Result<Vec<PolicyElement>> {
        let graph = self.read()?;
        graph.require(key)?;
        let mut found = reachable(&graph.assignments, key);
        found.remove(key);
        Ok(graph.resolve(&found))
    }

    fn ancestors(&self, key: &ElementKey) -> Result<Vec<PolicyElement>> {
        let graph = self.read()?;
        graph.require(key)?;
        let mut found = reachable(&graph.assigned_from, key);
        found.remove(key);
        Ok(graph.resolve(&found))
    }

    fn link(&self, src: &ElementKey, dst: &ElementKey) -> Result<bool> {
        let mut graph = self.write()?;
        graph.require(src)?;
        graph.require(dst)?;
        let Graph {
            links, linked_from, ..
        } = &mut *graph;
        Ok(insert_edge(links, linked_from, src, dst))
    }

    fn unlink(&self, src: &ElementKey, dst: &ElementKey) -> Result<bool> {
        let mut graph = self.write()?;
        graph.require(src)?;
        graph.require(dst)?;
        let Graph {
            links, linked_from, ..
        } = &mut *graph;
        Ok(remove_edge(links, linked_from, src, dst))
    }

    fn linked(&self, src: &ElementKey, dst: &ElementKey) -> Result<bool> {
        let graph = self.read()?;
        graph.require(src)?;
        graph.require(dst)?;
        Ok(src != dst && reaches(&graph.links, src, dst))
    }

    fn add_association(&self, association: Association) -> Result<()> {
        let mut graph = self.write()?;
        graph.require(&association.user_attribute)?;
        graph.require(&association.operation_set)?;
        graph.require(&association.object_attribute)?;
        graph.associations.push(association);
        Ok(())
    }

    fn associations_with(&self, operation: &ElementKey) -> Result<Vec<Association>> {
        let graph = self.read()?;
        graph.require(operation)?;
        let mut contains: HashMap<&ElementKey, bool> = HashMap::new();
        let mut found = Vec::new();
        for association in &graph.associations {
            let set = &association.operation_set;
            let hit = *contains
                .entry(set)
                .or_insert_with(|| set == operation || reaches(&graph.assignments, set, operation));
            if hit {
                found.push(association.clone());
            }
        }
        Ok(found)
    }

    fn policy_classes_for_object_attribute(&self, key: &ElementKey) -> Result<Vec<PolicyElement>> {
        self.reachable_of_kind(key, PolicyElementType::PolicyClass)
    }

    fn user_attributes_for_user(&self, key: &ElementKey) -> Result<Vec<PolicyElement>> {
        self.reachable_of_kind(key, PolicyElementType::UserAttribute)
    }

    fn checkpoint(&self) -> Result<MemoryCheckpoint> {
        Ok(MemoryCheckpoint(self.read()?.clone()))
    }

    fn restore(&self, checkpoint: MemoryCheckpoint) -> Result<()> {
        *self.write()? = checkpoint.0;
        debug!("store restored from checkpoint");
        Ok(())
    }
}

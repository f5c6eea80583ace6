//! Unit tests for the in-memory adapter

use ngac_types::{
    Association, Attributes, ElementKey, MachineId, PolicyElement, PolicyElementType,
};
use serde_json::json;

use crate::{MemoryStats, MemoryStore, PolicyStore, StoreError};

fn machine() -> MachineId {
    MachineId::new("pm-test")
}

fn add(store: &MemoryStore, kind: PolicyElementType, id: &str) -> ElementKey {
    store
        .add_element(PolicyElement::new(kind, id, machine(), Attributes::new()))
        .unwrap()
        .key()
}

fn ids(elements: &[PolicyElement]) -> Vec<&str> {
    elements.iter().map(PolicyElement::unique_identifier).collect()
}

// ============================================================================
// Elements
// ============================================================================

#[test]
fn duplicate_identifier_is_rejected() {
    let store = MemoryStore::new();
    add(&store, PolicyElementType::User, "alice");
    let result = store.add_element(PolicyElement::new(
        PolicyElementType::UserAttribute,
        "alice",
        machine(),
        Attributes::new(),
    ));
    assert!(matches!(result, Err(StoreError::DuplicateElement(_))));
}

#[test]
fn same_identifier_in_other_machine_is_allowed() {
    let store = MemoryStore::new();
    add(&store, PolicyElementType::User, "alice");
    let other = store.add_element(PolicyElement::new(
        PolicyElementType::User,
        "alice",
        MachineId::new("pm-other"),
        Attributes::new(),
    ));
    assert!(other.is_ok());
}

#[test]
fn find_all_scopes_to_kind_machine_and_filters() {
    let store = MemoryStore::new();
    let mut attrs = Attributes::new();
    attrs.insert("color".to_string(), json!("red"));
    store
        .add_element(PolicyElement::new(PolicyElementType::Object, "b", machine(), attrs))
        .unwrap();
    add(&store, PolicyElementType::Object, "a");
    add(&store, PolicyElementType::ObjectAttribute, "oa");
    store
        .add_element(PolicyElement::new(
            PolicyElementType::Object,
            "c",
            MachineId::new("pm-other"),
            Attributes::new(),
        ))
        .unwrap();

    let all = store
        .find_all_of_type(PolicyElementType::Object, &machine(), &Attributes::new())
        .unwrap();
    assert_eq!(ids(&all), vec!["a", "b"]);

    let mut filters = Attributes::new();
    filters.insert("color".to_string(), json!("red"));
    let red = store
        .find_all_of_type(PolicyElementType::Object, &machine(), &filters)
        .unwrap();
    assert_eq!(ids(&red), vec!["b"]);
}

#[test]
fn update_merges_and_ignores_unknown_keys() {
    let store = MemoryStore::new();
    let key = add(&store, PolicyElementType::Object, "doc");
    let mut attrs = Attributes::new();
    attrs.insert("owner".to_string(), json!("bob"));
    assert!(store.update(&key, &attrs).unwrap());

    let mut more = Attributes::new();
    more.insert("size".to_string(), json!(10));
    assert!(store.update(&key, &more).unwrap());

    let doc = store.element(&key).unwrap().unwrap();
    assert_eq!(doc.get_str("owner"), Some("bob"));
    assert_eq!(doc.get("size"), Some(&json!(10)));

    let missing = ElementKey::new(machine(), "missing");
    assert!(!store.update(&missing, &more).unwrap());
}

#[test]
fn delete_removes_own_edges_only() {
    let store = MemoryStore::new();
    let user = add(&store, PolicyElementType::User, "u");
    let ua = add(&store, PolicyElementType::UserAttribute, "ua");
    let pc = add(&store, PolicyElementType::PolicyClass, "pc");
    let ops = add(&store, PolicyElementType::OperationSet, "ops");
    let oa = add(&store, PolicyElementType::ObjectAttribute, "oa");
    store.assign(&user, &ua).unwrap();
    store.assign(&ua, &pc).unwrap();
    store
        .add_association(Association::new(ua.clone(), ops.clone(), oa.clone()))
        .unwrap();

    assert!(store.delete(&ua).unwrap());
    assert!(!store.delete(&ua).unwrap());

    assert!(store.element(&user).unwrap().is_some());
    assert!(store.element(&pc).unwrap().is_some());
    assert!(store.children(&user).unwrap().is_empty());
    assert!(store.parents(&pc).unwrap().is_empty());
    assert_eq!(
        store.stats().unwrap(),
        MemoryStats {
            elements: 4,
            assignments: 0,
            links: 0,
            associations: 0,
        }
    );
}

// ============================================================================
// Reachability
// ============================================================================

#[test]
fn connected_is_reflexive_and_directed() {
    let store = MemoryStore::new();
    let a = add(&store, PolicyElementType::ObjectAttribute, "a");
    let b = add(&store, PolicyElementType::ObjectAttribute, "b");
    let c = add(&store, PolicyElementType::ObjectAttribute, "c");
    store.assign(&a, &b).unwrap();
    store.assign(&b, &c).unwrap();

    assert!(store.connected(&a, &a).unwrap());
    assert!(store.connected(&a, &c).unwrap());
    assert!(!store.connected(&c, &a).unwrap());
    assert!(!store.connected(&b, &a).unwrap());
}

#[test]
fn assign_is_idempotent() {
    let store = MemoryStore::new();
    let a = add(&store, PolicyElementType::ObjectAttribute, "a");
    let b = add(&store, PolicyElementType::ObjectAttribute, "b");

    assert!(store.assign(&a, &b).unwrap());
    assert!(!store.assign(&a, &b).unwrap());
    assert_eq!(store.stats().unwrap().assignments, 1);

    assert!(store.unassign(&a, &b).unwrap());
    assert!(!store.connected(&a, &b).unwrap());
    assert!(!store.unassign(&a, &b).unwrap());
}

#[test]
fn reachability_terminates_on_cycles() {
    let store = MemoryStore::new();
    let a = add(&store, PolicyElementType::ObjectAttribute, "a");
    let b = add(&store, PolicyElementType::ObjectAttribute, "b");
    let c = add(&store, PolicyElementType::ObjectAttribute, "c");
    let d = add(&store, PolicyElementType::ObjectAttribute, "d");
    store.assign(&a, &b).unwrap();
    store.assign(&b, &c).unwrap();
    store.assign(&c, &a).unwrap();

    assert!(store.connected(&c, &b).unwrap());
    assert!(!store.connected(&a, &d).unwrap());
    assert_eq!(ids(&store.descendants(&a).unwrap()), vec!["b", "c"]);
    assert_eq!(ids(&store.ancestors(&a).unwrap()), vec!["b", "c"]);
}

#[test]
fn navigation_queries() {
    let store = MemoryStore::new();
    let obj = add(&store, PolicyElementType::Object, "obj");
    let oa1 = add(&store, PolicyElementType::ObjectAttribute, "oa1");
    let oa2 = add(&store, PolicyElementType::ObjectAttribute, "oa2");
    let pc = add(&store, PolicyElementType::PolicyClass, "pc");
    store.assign(&obj, &oa1).unwrap();
    store.assign(&oa1, &oa2).unwrap();
    store.assign(&oa2, &pc).unwrap();

    assert_eq!(ids(&store.children(&obj).unwrap()), vec!["oa1"]);
    assert_eq!(ids(&store.parents(&oa2).unwrap()), vec!["oa1"]);
    assert_eq!(ids(&store.descendants(&obj).unwrap()), vec!["oa1", "oa2", "pc"]);
    assert_eq!(ids(&store.ancestors(&pc).unwrap()), vec!["oa1", "oa2", "obj"]);
    assert_eq!(
        ids(&store.policy_classes_for_object_attribute(&obj).unwrap()),
        vec!["pc"]
    );
}

#[test]
fn unpersisted_keys_are_rejected() {
    let store = MemoryStore::new();
    let a = add(&store, PolicyElementType::ObjectAttribute, "a");
    let ghost = ElementKey::new(machine(), "ghost");

    assert!(matches!(
        store.assign(&a, &ghost),
        Err(StoreError::NotPersisted(key)) if key == ghost
    ));
    assert!(matches!(store.connected(&ghost, &a), Err(StoreError::NotPersisted(_))));
    assert!(matches!(store.descendants(&ghost), Err(StoreError::NotPersisted(_))));
    assert!(!store.element_in_machine(&ghost, &machine()).unwrap());
    assert!(store.element_in_machine(&a, &machine()).unwrap());
    assert!(!store.element_in_machine(&a, &MachineId::new("other")).unwrap());
}

// ============================================================================
// Links
// ============================================================================

#[test]
fn links_are_directed_and_irreflexive() {
    let store = MemoryStore::new();
    let a = add(&store, PolicyElementType::User, "a");
    let b = store
        .add_element(PolicyElement::new(
            PolicyElementType::User,
            "b",
            MachineId::new("pm-other"),
            Attributes::new(),
        ))
        .unwrap()
        .key();

    assert!(store.link(&a, &b).unwrap());
    assert!(store.linked(&a, &b).unwrap());
    assert!(!store.linked(&b, &a).unwrap());
    assert!(!store.linked(&a, &a).unwrap());
    assert!(!store.connected(&a, &b).unwrap());

    assert!(store.unlink(&a, &b).unwrap());
    assert!(!store.linked(&a, &b).unwrap());
}

// ============================================================================
// Associations
// ============================================================================

#[test]
fn associations_with_follows_nested_operation_sets() {
    let store = MemoryStore::new();
    let ua = add(&store, PolicyElementType::UserAttribute, "ua");
    let oa = add(&store, PolicyElementType::ObjectAttribute, "oa");
    let read = add(&store, PolicyElementType::Operation, "read");
    let write = add(&store, PolicyElementType::Operation, "write");
    let readers = add(&store, PolicyElementType::OperationSet, "readers");
    let editors = add(&store, PolicyElementType::OperationSet, "editors");
    store.assign(&editors, &readers).unwrap();
    store.assign(&editors, &write).unwrap();
    store.assign(&readers, &read).unwrap();

    let reading = Association::new(ua.clone(), readers.clone(), oa.clone());
    let editing = Association::new(ua, editors, oa);
    store.add_association(reading.clone()).unwrap();
    store.add_association(editing.clone()).unwrap();

    assert_eq!(store.associations_with(&read).unwrap(), vec![reading, editing.clone()]);
    assert_eq!(store.associations_with(&write).unwrap(), vec![editing]);
}

#[test]
fn user_attributes_for_user_is_transitive() {
    let store = MemoryStore::new();
    let user = add(&store, PolicyElementType::User, "u");
    let team = add(&store, PolicyElementType::UserAttribute, "team");
    let org = add(&store, PolicyElementType::UserAttribute, "org");
    let pc = add(&store, PolicyElementType::PolicyClass, "pc");
    store.assign(&user, &team).unwrap();
    store.assign(&team, &org).unwrap();
    store.assign(&org, &pc).unwrap();

    assert_eq!(
        ids(&store.user_attributes_for_user(&user).unwrap()),
        vec!["org", "team"]
    );
}

// ============================================================================
// Transactions
// ============================================================================

#[test]
fn transaction_rolls_back_on_error() {
    let store = MemoryStore::new();
    let a = add(&store, PolicyElementType::ObjectAttribute, "a");
    let before = store.stats().unwrap();

    let result: Result<(), StoreError> = store.transaction(|| {
        let b = add(&store, PolicyElementType::ObjectAttribute, "b");
        store.assign(&a, &b)?;
        Err(StoreError::Unsupported("forced failure"))
    });

    assert!(matches!(result, Err(StoreError::Unsupported("forced failure"))));
    assert_eq!(store.stats().unwrap(), before);
    assert!(store.element(&ElementKey::new(machine(), "b")).unwrap().is_none());
}

#[test]
fn transaction_commits_on_success() {
    let store = MemoryStore::new();
    let value: Result<u32, StoreError> = store.transaction(|| {
        add(&store, PolicyElementType::ObjectAttribute, "kept");
        Ok(7)
    });

    assert_eq!(value.unwrap(), 7);
    assert_eq!(store.stats().unwrap().elements, 1);
}

// ============================================================================
// Property Tests
// ============================================================================

use proptest::prelude::*;

proptest! {
    /// Property: along a chain, every node reaches every later node and
    /// never an earlier one
    #[test]
    fn prop_chain_reachability_is_directed(len in 2usize..12, i in 0usize..12, j in 0usize..12) {
        let store = MemoryStore::new();
        let keys: Vec<ElementKey> = (0..len)
            .map(|n| add(&store, PolicyElementType::ObjectAttribute, &format!("oa{n}")))
            .collect();
        for pair in keys.windows(2) {
            store.assign(&pair[0], &pair[1]).unwrap();
        }

        let (i, j) = (i % len, j % len);
        prop_assert_eq!(store.connected(&keys[i], &keys[j]).unwrap(), i <= j);
    }

    /// Property: deleting an element never removes any other element
    #[test]
    fn prop_delete_never_cascades(len in 1usize..10, victim in 0usize..10) {
        let store = MemoryStore::new();
        let keys: Vec<ElementKey> = (0..len)
            .map(|n| add(&store, PolicyElementType::ObjectAttribute, &format!("oa{n}")))
            .collect();
        for pair in keys.windows(2) {
            store.assign(&pair[0], &pair[1]).unwrap();
        }

        let victim = victim % len;
        prop_assert!(store.delete(&keys[victim]).unwrap());
        prop_assert_eq!(store.stats().unwrap().elements, len - 1);
    }
}

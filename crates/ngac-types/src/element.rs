//! Policy elements: the typed nodes of the access-control graph.
//!
//! Every element lives in exactly one policy machine and is addressed inside
//! a store by its [`ElementKey`]. Identity is (kind, identifier, machine);
//! the caller-defined `extra_attributes` never take part in equality.

use std::collections::BTreeMap;
use std::fmt::{self, Display};
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::prohibition::Prohibition;

/// Caller-defined metadata attached to an element.
pub type Attributes = BTreeMap<String, Value>;

/// Filter key that matches against the element identifier instead of an
/// extra attribute.
pub const UNIQUE_IDENTIFIER_KEY: &str = "unique_identifier";

// ============================================================================
// Machine identity
// ============================================================================

/// Identifier of a policy machine.
///
/// Several machines may share one store; the id is the namespace that keeps
/// their elements apart.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MachineId(String);

impl MachineId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random (v4) machine id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for MachineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MachineId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for MachineId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

// ============================================================================
// Element kinds
// ============================================================================

/// The type tag of a policy element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyElementType {
    User,
    UserAttribute,
    Object,
    ObjectAttribute,
    Operation,
    OperationSet,
    PolicyClass,
}

impl PolicyElementType {
    /// All kinds, in declaration order.
    pub const ALL: [PolicyElementType; 7] = [
        Self::User,
        Self::UserAttribute,
        Self::Object,
        Self::ObjectAttribute,
        Self::Operation,
        Self::OperationSet,
        Self::PolicyClass,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::UserAttribute => "user_attribute",
            Self::Object => "object",
            Self::ObjectAttribute => "object_attribute",
            Self::Operation => "operation",
            Self::OperationSet => "operation_set",
            Self::PolicyClass => "policy_class",
        }
    }

    /// Users and user attributes may act as the subject of a privilege query.
    pub fn is_subject(self) -> bool {
        matches!(self, Self::User | Self::UserAttribute)
    }

    /// Objects specialize object attributes, so both qualify here.
    pub fn is_object_attribute(self) -> bool {
        matches!(self, Self::Object | Self::ObjectAttribute)
    }
}

impl Display for PolicyElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Element key
// ============================================================================

/// Store address of an element: its machine plus its unique identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ElementKey {
    pub machine: MachineId,
    pub unique_identifier: String,
}

impl ElementKey {
    pub fn new(machine: MachineId, unique_identifier: impl Into<String>) -> Self {
        Self {
            machine,
            unique_identifier: unique_identifier.into(),
        }
    }
}

impl Display for ElementKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.machine, self.unique_identifier)
    }
}

// ============================================================================
// Policy element
// ============================================================================

/// A typed node of the policy graph.
///
/// Values of this type are handles: they carry the persisted identity and a
/// snapshot of the attributes taken when the handle was produced. Mutations
/// made through [`set`](Self::set) stay local until written back through the
/// policy machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyElement {
    kind: PolicyElementType,
    unique_identifier: String,
    policy_machine_uuid: MachineId,
    #[serde(default)]
    extra_attributes: Attributes,
}

impl PolicyElement {
    pub fn new(
        kind: PolicyElementType,
        unique_identifier: impl Into<String>,
        policy_machine_uuid: MachineId,
        extra_attributes: Attributes,
    ) -> Self {
        Self {
            kind,
            unique_identifier: unique_identifier.into(),
            policy_machine_uuid,
            extra_attributes,
        }
    }

    pub fn kind(&self) -> PolicyElementType {
        self.kind
    }

    pub fn unique_identifier(&self) -> &str {
        &self.unique_identifier
    }

    pub fn policy_machine_uuid(&self) -> &MachineId {
        &self.policy_machine_uuid
    }

    pub fn key(&self) -> ElementKey {
        ElementKey::new(self.policy_machine_uuid.clone(), &self.unique_identifier)
    }

    pub fn extra_attributes(&self) -> &Attributes {
        &self.extra_attributes
    }

    /// Returns an extra attribute, `None` if it was never set.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.extra_attributes.get(key)
    }

    /// Returns an extra attribute as a string slice, if it is a JSON string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Sets an extra attribute on this handle only.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.extra_attributes.insert(key.into(), value.into());
    }

    /// Builder form of [`set`](Self::set).
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    /// Merges `attrs` into the extra attributes. Keys absent from `attrs`
    /// are left untouched.
    pub fn merge_attributes(&mut self, attrs: &Attributes) {
        for (key, value) in attrs {
            self.extra_attributes.insert(key.clone(), value.clone());
        }
    }

    /// An operation whose identifier carries the prohibition prefix.
    pub fn is_prohibition(&self) -> bool {
        self.kind == PolicyElementType::Operation
            && Prohibition::is_prohibition_name(&self.unique_identifier)
    }

    /// True if every filter matches.
    ///
    /// A `null` filter value matches both a missing key and an explicit
    /// `null`. The key [`UNIQUE_IDENTIFIER_KEY`] compares against the
    /// identifier.
    pub fn matches(&self, filters: &Attributes) -> bool {
        filters.iter().all(|(key, expected)| {
            if key == UNIQUE_IDENTIFIER_KEY {
                return expected.as_str() == Some(self.unique_identifier.as_str());
            }
            match self.extra_attributes.get(key) {
                Some(actual) => actual == expected,
                None => expected.is_null(),
            }
        })
    }

    /// Returns the value used for substring filtering under `key`.
    pub fn searchable_value(&self, key: &str) -> Option<String> {
        if key == UNIQUE_IDENTIFIER_KEY {
            return Some(self.unique_identifier.clone());
        }
        match self.extra_attributes.get(key)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

impl PartialEq for PolicyElement {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.unique_identifier == other.unique_identifier
            && self.policy_machine_uuid == other.policy_machine_uuid
    }
}

impl Eq for PolicyElement {}

impl Hash for PolicyElement {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
        self.unique_identifier.hash(state);
        self.policy_machine_uuid.hash(state);
    }
}

impl Display for PolicyElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind, self.unique_identifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn machine() -> MachineId {
        MachineId::new("pm-1")
    }

    #[test]
    fn test_identity_ignores_attributes() {
        let a = PolicyElement::new(PolicyElementType::User, "alice", machine(), Attributes::new())
            .with_attribute("color", "red");
        let b = PolicyElement::new(PolicyElementType::User, "alice", machine(), Attributes::new());
        assert_eq!(a, b);
    }

    #[test]
    fn test_identity_includes_kind_and_machine() {
        let user = PolicyElement::new(PolicyElementType::User, "x", machine(), Attributes::new());
        let ua = PolicyElement::new(
            PolicyElementType::UserAttribute,
            "x",
            machine(),
            Attributes::new(),
        );
        let other_pm = PolicyElement::new(
            PolicyElementType::User,
            "x",
            MachineId::new("pm-2"),
            Attributes::new(),
        );
        assert_ne!(user, ua);
        assert_ne!(user, other_pm);
    }

    #[test]
    fn test_merge_keeps_unspecified_keys() {
        let mut e = PolicyElement::new(PolicyElementType::Object, "doc", machine(), Attributes::new())
            .with_attribute("owner", "bob")
            .with_attribute("size", 3);
        let mut update = Attributes::new();
        update.insert("size".to_string(), json!(4));
        e.merge_attributes(&update);

        assert_eq!(e.get_str("owner"), Some("bob"));
        assert_eq!(e.get("size"), Some(&json!(4)));
    }

    #[test]
    fn test_null_filter_matches_missing_and_null() {
        let missing = PolicyElement::new(PolicyElementType::Object, "a", machine(), Attributes::new());
        let explicit = missing.clone().with_attribute("color", Value::Null);
        let set = missing.clone().with_attribute("color", "blue");

        let mut filters = Attributes::new();
        filters.insert("color".to_string(), Value::Null);

        assert!(missing.matches(&filters));
        assert!(explicit.matches(&filters));
        assert!(!set.matches(&filters));
    }

    #[test]
    fn test_filter_on_unique_identifier() {
        let e = PolicyElement::new(PolicyElementType::Object, "a", machine(), Attributes::new());
        let mut filters = Attributes::new();
        filters.insert(UNIQUE_IDENTIFIER_KEY.to_string(), json!("a"));
        assert!(e.matches(&filters));
        filters.insert(UNIQUE_IDENTIFIER_KEY.to_string(), json!("b"));
        assert!(!e.matches(&filters));
    }

    #[test]
    fn test_prohibition_requires_operation_kind() {
        let op = PolicyElement::new(PolicyElementType::Operation, "~read", machine(), Attributes::new());
        let obj = PolicyElement::new(PolicyElementType::Object, "~read", machine(), Attributes::new());
        assert!(op.is_prohibition());
        assert!(!obj.is_prohibition());
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&PolicyElementType::ObjectAttribute).unwrap();
        assert_eq!(json, "\"object_attribute\"");
    }

    #[test]
    fn test_generated_machine_ids_differ() {
        assert_ne!(MachineId::generate(), MachineId::generate());
    }
}

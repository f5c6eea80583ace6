//! Associations and derived privileges.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use crate::element::{ElementKey, MachineId, PolicyElement};

/// The ternary fact `(user_attribute, operation_set, object_attribute)`.
///
/// Grants every operation contained (transitively) by the operation set to
/// subjects connected to the user attribute, over objects connected to the
/// object attribute.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Association {
    pub user_attribute: ElementKey,
    pub operation_set: ElementKey,
    pub object_attribute: ElementKey,
}

impl Association {
    pub fn new(
        user_attribute: ElementKey,
        operation_set: ElementKey,
        object_attribute: ElementKey,
    ) -> Self {
        Self {
            user_attribute,
            operation_set,
            object_attribute,
        }
    }

    /// The machine the association belongs to.
    pub fn machine(&self) -> &MachineId {
        &self.user_attribute.machine
    }

    /// Whether all three endpoints belong to `machine`.
    pub fn in_machine(&self, machine: &MachineId) -> bool {
        self.user_attribute.machine == *machine
            && self.operation_set.machine == *machine
            && self.object_attribute.machine == *machine
    }

    /// Whether `key` is one of the three endpoints.
    pub fn references(&self, key: &ElementKey) -> bool {
        self.user_attribute == *key || self.operation_set == *key || self.object_attribute == *key
    }
}

impl Display for Association {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {})",
            self.user_attribute.unique_identifier,
            self.operation_set.unique_identifier,
            self.object_attribute.unique_identifier
        )
    }
}

/// A derived fact: `subject` may perform `operation` on `object`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Privilege {
    pub subject: PolicyElement,
    pub operation: PolicyElement,
    pub object: PolicyElement,
}

impl Privilege {
    pub fn new(subject: PolicyElement, operation: PolicyElement, object: PolicyElement) -> Self {
        Self {
            subject,
            operation,
            object,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(machine: &str, id: &str) -> ElementKey {
        ElementKey::new(MachineId::new(machine), id)
    }

    #[test]
    fn test_in_machine_requires_all_endpoints() {
        let local = Association::new(key("a", "ua"), key("a", "ops"), key("a", "oa"));
        let mixed = Association::new(key("a", "ua"), key("b", "ops"), key("a", "oa"));
        assert!(local.in_machine(&MachineId::new("a")));
        assert!(!mixed.in_machine(&MachineId::new("a")));
    }

    #[test]
    fn test_references() {
        let assoc = Association::new(key("a", "ua"), key("a", "ops"), key("a", "oa"));
        assert!(assoc.references(&key("a", "ops")));
        assert!(!assoc.references(&key("a", "other")));
    }
}

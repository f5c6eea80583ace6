//! The assignment whitelist.
//!
//! An assignment `(src, dst)` reads "src is contained by dst". Only the kind
//! pairs below may be assigned; anything else is rejected when the edge is
//! created.

use crate::element::PolicyElementType::{
    self, Object, ObjectAttribute, Operation, OperationSet, PolicyClass, User, UserAttribute,
};

/// Every `(src, dst)` kind pair an assignment may connect.
pub const ALLOWED_ASSIGNMENTS: [(PolicyElementType, PolicyElementType); 10] = [
    (Object, Object),
    (Object, ObjectAttribute),
    (ObjectAttribute, ObjectAttribute),
    (ObjectAttribute, Object),
    (User, UserAttribute),
    (UserAttribute, UserAttribute),
    (UserAttribute, PolicyClass),
    (ObjectAttribute, PolicyClass),
    (OperationSet, OperationSet),
    (OperationSet, Operation),
];

/// Returns whether an assignment from `src` to `dst` is permitted.
pub fn assignment_allowed(src: PolicyElementType, dst: PolicyElementType) -> bool {
    ALLOWED_ASSIGNMENTS.contains(&(src, dst))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(Object, Object; "object to object")]
    #[test_case(Object, ObjectAttribute; "object to object attribute")]
    #[test_case(ObjectAttribute, ObjectAttribute; "object attribute to object attribute")]
    #[test_case(ObjectAttribute, Object; "object attribute to object")]
    #[test_case(User, UserAttribute; "user to user attribute")]
    #[test_case(UserAttribute, UserAttribute; "user attribute to user attribute")]
    #[test_case(UserAttribute, PolicyClass; "user attribute to policy class")]
    #[test_case(ObjectAttribute, PolicyClass; "object attribute to policy class")]
    #[test_case(OperationSet, OperationSet; "operation set to operation set")]
    #[test_case(OperationSet, Operation; "operation set to operation")]
    fn allowed_pairs(src: PolicyElementType, dst: PolicyElementType) {
        assert!(assignment_allowed(src, dst));
    }

    #[test_case(User, User; "user to user")]
    #[test_case(User, PolicyClass; "user to policy class")]
    #[test_case(UserAttribute, User; "user attribute to user")]
    #[test_case(Object, PolicyClass; "object to policy class")]
    #[test_case(Operation, OperationSet; "operation to operation set")]
    #[test_case(PolicyClass, PolicyClass; "policy class to policy class")]
    #[test_case(User, ObjectAttribute; "user to object attribute")]
    fn rejected_pairs(src: PolicyElementType, dst: PolicyElementType) {
        assert!(!assignment_allowed(src, dst));
    }

    #[test]
    fn whitelist_has_exactly_ten_pairs() {
        let allowed = PolicyElementType::ALL
            .iter()
            .flat_map(|src| PolicyElementType::ALL.iter().map(move |dst| (*src, *dst)))
            .filter(|(src, dst)| assignment_allowed(*src, *dst))
            .count();
        assert_eq!(allowed, 10);
    }
}

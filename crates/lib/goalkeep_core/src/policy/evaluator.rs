//! Policy decision function.

use tracing::debug;

use super::{Action, EntityType, PolicyMatrix, Role};
use crate::auth::AuthError;

/// Applies a [`PolicyMatrix`] to ownership-qualified requests.
#[derive(Debug, Clone, Copy)]
pub struct PolicyEvaluator<'a> {
    matrix: &'a PolicyMatrix,
}

impl Default for PolicyEvaluator<'static> {
    fn default() -> Self {
        Self::new(PolicyMatrix::builtin())
    }
}

impl<'a> PolicyEvaluator<'a> {
    pub fn new(matrix: &'a PolicyMatrix) -> Self {
        Self { matrix }
    }

    /// Whether `role` may perform `action` on `entity`.
    ///
    /// A missing rule denies. For [`Action::Create`] `is_own_resource` is
    /// ignored and the rule's `mine` flag decides.
    pub fn is_allowed(
        &self,
        role: Role,
        entity: EntityType,
        action: Action,
        is_own_resource: bool,
    ) -> bool {
        let Some(rule) = self.matrix.rule(role, entity, action) else {
            return false;
        };
        if action == Action::Create {
            return rule.mine;
        }
        if is_own_resource { rule.mine } else { rule.others }
    }

    /// String-keyed variant; any unknown name denies.
    pub fn is_allowed_by_name(
        &self,
        role: &str,
        entity: &str,
        action: &str,
        is_own_resource: bool,
    ) -> bool {
        match (role.parse(), entity.parse(), action.parse()) {
            (Ok(role), Ok(entity), Ok(action)) => {
                self.is_allowed(role, entity, action, is_own_resource)
            }
            _ => false,
        }
    }

    /// [`Self::is_allowed`] as a `Result`, for use with `?` in handlers.
    pub fn require(
        &self,
        role: Role,
        entity: EntityType,
        action: Action,
        is_own_resource: bool,
    ) -> Result<(), AuthError> {
        if self.is_allowed(role, entity, action, is_own_resource) {
            Ok(())
        } else {
            debug!(%role, %entity, %action, is_own_resource, "policy denied");
            Err(AuthError::PolicyDenied(format!(
                "{role} may not {action} {entity}"
            )))
        }
    }
}

/// Evaluate against the built-in matrix.
pub fn is_allowed(role: Role, entity: EntityType, action: Action, is_own_resource: bool) -> bool {
    PolicyEvaluator::default().is_allowed(role, entity, action, is_own_resource)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::policy::PermissionRule;

    #[test]
    fn missing_rule_denies() {
        let empty = PolicyMatrix::default();
        let eval = PolicyEvaluator::new(&empty);
        for action in Action::ALL {
            assert!(!eval.is_allowed(Role::SuperAdmin, EntityType::Goal, action, true));
        }
    }

    #[test]
    fn ownership_selects_mine_or_others() {
        assert!(is_allowed(Role::Teacher, EntityType::Student, Action::Update, true));
        assert!(!is_allowed(Role::Teacher, EntityType::Student, Action::Update, false));
        assert!(is_allowed(Role::ProgramAdmin, EntityType::Student, Action::Update, false));
    }

    #[test]
    fn create_uses_mine_flag_as_capability() {
        // ProgramAdmin/User create is MineOnly: allowed regardless of ownership.
        assert!(is_allowed(Role::ProgramAdmin, EntityType::User, Action::Create, false));
        assert!(is_allowed(Role::ProgramAdmin, EntityType::User, Action::Create, true));
        assert!(!is_allowed(Role::Paraeducator, EntityType::Goal, Action::Create, true));
    }

    #[test]
    fn create_ignores_others_flag() {
        let m = PolicyMatrix::from_rules([(
            Role::Teacher,
            EntityType::Goal,
            Action::Create,
            PermissionRule {
                mine: false,
                others: true,
            },
        )]);
        let eval = PolicyEvaluator::new(&m);
        assert!(!eval.is_allowed(Role::Teacher, EntityType::Goal, Action::Create, false));
    }

    #[test]
    fn names_resolve_and_unknown_names_deny() {
        let eval = PolicyEvaluator::default();
        assert!(eval.is_allowed_by_name("SuperAdmin", "school_district", "delete", false));
        assert!(!eval.is_allowed_by_name("Janitor", "student", "read", true));
        assert!(!eval.is_allowed_by_name("Teacher", "cafeteria", "read", true));
        assert!(!eval.is_allowed_by_name("Teacher", "student", "archive", true));
    }

    #[test]
    fn require_reports_policy_denied() {
        let eval = PolicyEvaluator::default();
        assert!(eval.require(Role::Teacher, EntityType::Goal, Action::Read, true).is_ok());
        let err = eval
            .require(Role::Paraeducator, EntityType::Goal, Action::Update, true)
            .unwrap_err();
        assert!(matches!(err, AuthError::PolicyDenied(_)));
    }

    fn any_role() -> impl Strategy<Value = Role> {
        proptest::sample::select(Role::ALL.to_vec())
    }

    fn any_entity() -> impl Strategy<Value = EntityType> {
        proptest::sample::select(EntityType::ALL.to_vec())
    }

    fn any_action() -> impl Strategy<Value = Action> {
        proptest::sample::select(Action::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn decision_is_deterministic(
            role in any_role(),
            entity in any_entity(),
            action in any_action(),
            own in any::<bool>(),
        ) {
            let first = is_allowed(role, entity, action, own);
            for _ in 0..3 {
                prop_assert_eq!(is_allowed(role, entity, action, own), first);
            }
            let rebuilt = PolicyMatrix::builtin().clone();
            prop_assert_eq!(PolicyEvaluator::new(&rebuilt).is_allowed(role, entity, action, own), first);
        }

        #[test]
        fn create_ignores_ownership(role in any_role(), entity in any_entity()) {
            prop_assert_eq!(
                is_allowed(role, entity, Action::Create, true),
                is_allowed(role, entity, Action::Create, false)
            );
        }

        #[test]
        fn allowed_for_others_implies_allowed_for_own(
            role in any_role(),
            entity in any_entity(),
            action in any_action(),
        ) {
            if is_allowed(role, entity, action, false) {
                prop_assert!(is_allowed(role, entity, action, true));
            }
        }
    }
}

//! Static permission table.
//!
//! Rules are stored flat, keyed by `(role, entity, action)`, built once and
//! never mutated. Adding a role or entity means adding rows here; the
//! evaluator does not change.

use std::collections::HashMap;
use std::sync::LazyLock;

use serde::Serialize;

use super::{Action, EntityType, Role};

/// Permission for one `(role, entity, action)` triple.
///
/// `mine` applies when acting on one's own resource, `others` otherwise.
/// For [`Action::Create`] there is no owner yet, so `mine` is read as the
/// blanket "may create" flag and `others` is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PermissionRule {
    pub mine: bool,
    pub others: bool,
}

impl PermissionRule {
    pub const ALLOW: PermissionRule = PermissionRule {
        mine: true,
        others: true,
    };
    pub const MINE_ONLY: PermissionRule = PermissionRule {
        mine: true,
        others: false,
    };
    pub const DENY: PermissionRule = PermissionRule {
        mine: false,
        others: false,
    };
}

type RuleKey = (Role, EntityType, Action);

/// Immutable `(role, entity, action) → rule` lookup table.
#[derive(Debug, Clone, Default)]
pub struct PolicyMatrix {
    rules: HashMap<RuleKey, PermissionRule>,
}

static BUILTIN: LazyLock<PolicyMatrix> = LazyLock::new(PolicyMatrix::build_builtin);

impl PolicyMatrix {
    /// Build a matrix from explicit rows. Later rows win on duplicate keys.
    pub fn from_rules<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = (Role, EntityType, Action, PermissionRule)>,
    {
        let rules = rows
            .into_iter()
            .map(|(role, entity, action, rule)| ((role, entity, action), rule))
            .collect();
        Self { rules }
    }

    /// The process-wide built-in table.
    pub fn builtin() -> &'static PolicyMatrix {
        &BUILTIN
    }

    /// Look up a rule. `None` means implicit deny.
    pub fn rule(&self, role: Role, entity: EntityType, action: Action) -> Option<PermissionRule> {
        self.rules.get(&(role, entity, action)).copied()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    fn build_builtin() -> Self {
        use EntityType::*;
        const A: PermissionRule = PermissionRule::ALLOW;
        const M: PermissionRule = PermissionRule::MINE_ONLY;
        const D: PermissionRule = PermissionRule::DENY;

        // Columns: create, read, update, delete.
        let table: [(Role, [(EntityType, [PermissionRule; 4]); 6]); 5] = [
            (
                Role::SuperAdmin,
                [
                    (SchoolDistrict, [A, A, A, A]),
                    (Program, [A, A, A, A]),
                    (User, [A, A, A, A]),
                    (Student, [A, A, A, A]),
                    (Goal, [A, A, A, A]),
                    (ProgressEvent, [A, A, A, A]),
                ],
            ),
            (
                Role::DistrictAdmin,
                [
                    (SchoolDistrict, [D, M, M, D]),
                    (Program, [M, A, A, M]),
                    (User, [A, A, A, A]),
                    (Student, [A, A, A, A]),
                    (Goal, [A, A, A, A]),
                    (ProgressEvent, [A, A, A, A]),
                ],
            ),
            (
                Role::ProgramAdmin,
                [
                    (SchoolDistrict, [D, D, D, D]),
                    (Program, [D, M, M, D]),
                    (User, [M, A, M, D]),
                    (Student, [A, A, A, M]),
                    (Goal, [A, A, A, M]),
                    (ProgressEvent, [A, A, A, M]),
                ],
            ),
            (
                Role::Teacher,
                [
                    (SchoolDistrict, [D, D, D, D]),
                    (Program, [D, M, D, D]),
                    (User, [D, M, M, D]),
                    (Student, [M, M, M, M]),
                    (Goal, [M, M, M, M]),
                    (ProgressEvent, [M, M, M, M]),
                ],
            ),
            (
                Role::Paraeducator,
                [
                    (SchoolDistrict, [D, D, D, D]),
                    (Program, [D, M, D, D]),
                    (User, [D, M, M, D]),
                    (Student, [D, M, D, D]),
                    (Goal, [D, M, D, D]),
                    (ProgressEvent, [M, M, M, D]),
                ],
            ),
        ];

        Self::from_rules(table.into_iter().flat_map(|(role, entities)| {
            entities.into_iter().flat_map(move |(entity, rules)| {
                Action::ALL
                    .into_iter()
                    .zip(rules)
                    .map(move |(action, rule)| (role, entity, action, rule))
            })
        }))
    }
}

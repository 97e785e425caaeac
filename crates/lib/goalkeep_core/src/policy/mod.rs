//! Role-based permission policy.
//!
//! A static [`PolicyMatrix`] maps `(role, entity, action)` to a
//! [`PermissionRule`], and [`is_allowed`] is the single decision function all
//! role checks funnel through.

pub mod evaluator;
pub mod matrix;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use evaluator::{PolicyEvaluator, is_allowed};
pub use matrix::{PermissionRule, PolicyMatrix};

/// Closed set of roles a program membership can grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    SuperAdmin,
    DistrictAdmin,
    ProgramAdmin,
    Teacher,
    Paraeducator,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::SuperAdmin,
        Role::DistrictAdmin,
        Role::ProgramAdmin,
        Role::Teacher,
        Role::Paraeducator,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "SuperAdmin",
            Role::DistrictAdmin => "DistrictAdmin",
            Role::ProgramAdmin => "ProgramAdmin",
            Role::Teacher => "Teacher",
            Role::Paraeducator => "Paraeducator",
        }
    }
}

/// Kinds of resource the policy table knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    SchoolDistrict,
    Program,
    User,
    Student,
    Goal,
    ProgressEvent,
}

impl EntityType {
    pub const ALL: [EntityType; 6] = [
        EntityType::SchoolDistrict,
        EntityType::Program,
        EntityType::User,
        EntityType::Student,
        EntityType::Goal,
        EntityType::ProgressEvent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::SchoolDistrict => "school_district",
            EntityType::Program => "program",
            EntityType::User => "user",
            EntityType::Student => "student",
            EntityType::Goal => "goal",
            EntityType::ProgressEvent => "progress_event",
        }
    }
}

/// CRUD action on an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
}

impl Action {
    pub const ALL: [Action; 4] = [Action::Create, Action::Read, Action::Update, Action::Delete];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Read => "read",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }
}

/// Error returned when parsing an unknown role, entity or action name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct UnknownName {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! impl_name_enum {
    ($t:ty, $kind:literal) => {
        impl fmt::Display for $t {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $t {
            type Err = UnknownName;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                <$t>::ALL
                    .into_iter()
                    .find(|v| v.as_str() == s)
                    .ok_or_else(|| UnknownName {
                        kind: $kind,
                        value: s.to_string(),
                    })
            }
        }
    };
}

impl_name_enum!(Role, "role");
impl_name_enum!(EntityType, "entity type");
impl_name_enum!(Action, "action");

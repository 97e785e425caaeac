//! Two-layer resource authorization.
//!
//! Layer 1 asks whether the caller has any current assignment to the parent
//! student, and of what kind. Layer 2 runs only for operations on one child
//! entry and decides from the assignment kind and the entry's author.
//! Anything not explicitly allowed is denied.

use std::fmt;
use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use super::AuthError;
use crate::models::assignment::{AssignmentKind, RelationshipTier};
use crate::store::AssignmentStore;

/// Operations checked against a caller's student assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ViewStudent,
    GenerateReport,
    CreateGoal,
    EditGoal,
    AddProgressEntry,
    ViewSensitiveNotes,
    EditProgressEntry,
    DeleteProgressEntry,
}

impl Operation {
    /// Whether the operation targets a single child entry.
    pub fn is_instance_scoped(&self) -> bool {
        matches!(self, Self::EditProgressEntry | Self::DeleteProgressEntry)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ViewStudent => "ViewStudent",
            Self::GenerateReport => "GenerateReport",
            Self::CreateGoal => "CreateGoal",
            Self::EditGoal => "EditGoal",
            Self::AddProgressEntry => "AddProgressEntry",
            Self::ViewSensitiveNotes => "ViewSensitiveNotes",
            Self::EditProgressEntry => "EditProgressEntry",
            Self::DeleteProgressEntry => "DeleteProgressEntry",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The resource an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceScope {
    /// A student as a whole.
    Student { student_id: Uuid },
    /// One entry recorded under a student.
    Entry {
        student_id: Uuid,
        entry_id: Uuid,
        created_by: Uuid,
    },
}

impl ResourceScope {
    pub fn student_id(&self) -> Uuid {
        match *self {
            Self::Student { student_id } | Self::Entry { student_id, .. } => student_id,
        }
    }
}

/// Layer 1: may an assignment of `kind` perform a student-scoped `op`?
///
/// For instance-scoped operations this only checks that the caller can see
/// the student; [`instance_allows`] makes the real decision.
pub fn collection_allows(kind: AssignmentKind, op: Operation) -> bool {
    use AssignmentKind::*;
    match op {
        Operation::ViewStudent | Operation::GenerateReport => true,
        Operation::CreateGoal | Operation::EditGoal => {
            matches!(kind, PrimaryTeacher | TemporaryCoverage)
        }
        Operation::AddProgressEntry => {
            matches!(kind, PrimaryTeacher | TemporaryCoverage | Paraeducator)
        }
        Operation::ViewSensitiveNotes => kind == PrimaryTeacher,
        Operation::EditProgressEntry | Operation::DeleteProgressEntry => {
            collection_allows(kind, Operation::ViewStudent)
        }
    }
}

/// Layer 2: may an assignment of `kind` act on an entry written by
/// `created_by`?
pub fn instance_allows(kind: AssignmentKind, created_by: Uuid, user_id: Uuid) -> bool {
    match kind.tier() {
        RelationshipTier::Primary => true,
        RelationshipTier::Restricted => created_by == user_id,
        RelationshipTier::Observer => false,
    }
}

/// Runs both layers against an [`AssignmentStore`].
#[derive(Clone)]
pub struct ResourceAuthorizer {
    assignments: Arc<dyn AssignmentStore>,
}

impl fmt::Debug for ResourceAuthorizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceAuthorizer").finish_non_exhaustive()
    }
}

impl ResourceAuthorizer {
    pub fn new(assignments: Arc<dyn AssignmentStore>) -> Self {
        Self { assignments }
    }

    /// Authorize `user_id` to perform `op` on `scope`.
    ///
    /// Returns the assignment kind that granted access. Instance-scoped
    /// operations require an [`ResourceScope::Entry`] and vice versa; a
    /// mismatch is denied.
    pub async fn authorize(
        &self,
        user_id: Uuid,
        scope: ResourceScope,
        op: Operation,
    ) -> Result<AssignmentKind, AuthError> {
        let student_id = scope.student_id();
        let Some(assignment) = self
            .assignments
            .get_active_assignment(user_id, student_id)
            .await?
        else {
            debug!(%user_id, %student_id, %op, "no active assignment");
            return Err(deny(op));
        };
        let kind = assignment.kind;

        if !collection_allows(kind, op) {
            debug!(%user_id, %student_id, %op, kind = kind.as_str(), "collection scope denied");
            return Err(deny(op));
        }

        match (scope, op.is_instance_scoped()) {
            (ResourceScope::Student { .. }, false) => Ok(kind),
            (
                ResourceScope::Entry {
                    entry_id,
                    created_by,
                    ..
                },
                true,
            ) => {
                if instance_allows(kind, created_by, user_id) {
                    Ok(kind)
                } else {
                    debug!(%user_id, %entry_id, %op, kind = kind.as_str(), "instance scope denied");
                    Err(deny(op))
                }
            }
            _ => {
                debug!(%user_id, %op, ?scope, "operation does not match resource scope");
                Err(deny(op))
            }
        }
    }

    /// Students the user may see, filtered by the store.
    pub async fn accessible_students(&self, user_id: Uuid) -> Result<Vec<Uuid>, AuthError> {
        self.assignments.list_accessible_students(user_id).await
    }
}

fn deny(op: Operation) -> AuthError {
    AuthError::PolicyDenied(format!("not permitted to {op}"))
}

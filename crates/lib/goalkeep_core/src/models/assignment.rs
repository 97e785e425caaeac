//! User-to-student assignment records, read by the authorization chain.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How a user is connected to a specific student.
///
/// A role says what a user *is*; an assignment kind says how they relate to
/// one particular student.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssignmentKind {
    PrimaryTeacher,
    Paraeducator,
    Supervisor,
    TemporaryCoverage,
}

/// Write-capability tier of an assignment kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationshipTier {
    /// May act on any child record under the student.
    Primary,
    /// May act only on child records it created.
    Restricted,
    /// Read-only.
    Observer,
}

impl AssignmentKind {
    pub fn tier(&self) -> RelationshipTier {
        match self {
            Self::PrimaryTeacher | Self::TemporaryCoverage => RelationshipTier::Primary,
            Self::Paraeducator => RelationshipTier::Restricted,
            Self::Supervisor => RelationshipTier::Observer,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PrimaryTeacher => "PrimaryTeacher",
            Self::Paraeducator => "Paraeducator",
            Self::Supervisor => "Supervisor",
            Self::TemporaryCoverage => "TemporaryCoverage",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PrimaryTeacher" => Some(Self::PrimaryTeacher),
            "Paraeducator" => Some(Self::Paraeducator),
            "Supervisor" => Some(Self::Supervisor),
            "TemporaryCoverage" => Some(Self::TemporaryCoverage),
            _ => None,
        }
    }
}

/// A row of `student_assignments`.
#[derive(Debug, Clone)]
pub struct AssignmentRecord {
    pub user_id: Uuid,
    pub student_id: Uuid,
    pub kind: AssignmentKind,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub is_active: bool,
}

impl AssignmentRecord {
    /// Active means flagged active and `start_date <= today <= end_date`
    /// (an open end date never expires).
    pub fn is_current(&self, today: NaiveDate) -> bool {
        self.is_active && self.start_date <= today && self.end_date.is_none_or(|end| end >= today)
    }
}

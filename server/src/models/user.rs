use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::utils::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Student,
    Department,
    Organization,
    CampusChief,
    Admin,
}

/// What a role may do. Ownership rules (organizer edits) are checked
/// separately against the event itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    CreateEvents,
    AutoApproveClassEvents,
    DecideEvents,
    Register,
    ViewAllEvents,
    ViewReviewQueues,
    ViewConflicts,
    ViewStatistics,
    ConfirmPayments,
    ListOwnEvents,
    ListAllEvents,
    ViewAttendanceCodes,
}

const STUDENT: &[Capability] = &[Capability::Register];
const ORGANIZER: &[Capability] = &[
    Capability::CreateEvents,
    Capability::AutoApproveClassEvents,
    Capability::ListOwnEvents,
];
const CAMPUS_CHIEF: &[Capability] = &[
    Capability::DecideEvents,
    Capability::ViewAllEvents,
    Capability::ViewReviewQueues,
    Capability::ViewConflicts,
    Capability::ViewStatistics,
];
const ADMIN: &[Capability] = &[
    Capability::ViewAllEvents,
    Capability::ViewReviewQueues,
    Capability::ViewConflicts,
    Capability::ViewStatistics,
    Capability::ConfirmPayments,
    Capability::ListAllEvents,
    Capability::ViewAttendanceCodes,
];

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Department => "department",
            Role::Organization => "organization",
            Role::CampusChief => "campus-chief",
            Role::Admin => "admin",
        }
    }

    pub fn capabilities(&self) -> &'static [Capability] {
        match self {
            Role::Student => STUDENT,
            Role::Department | Role::Organization => ORGANIZER,
            Role::CampusChief => CAMPUS_CHIEF,
            Role::Admin => ADMIN,
        }
    }

    pub fn allows(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "student" => Ok(Role::Student),
            "department" => Ok(Role::Department),
            "organization" => Ok(Role::Organization),
            "campus-chief" | "campus_chief" | "chief" => Ok(Role::CampusChief),
            "admin" => Ok(Role::Admin),
            other => Err(AppError::AuthError(format!("Unknown role '{}'", other))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The already-authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: Uuid,
    pub username: String,
    pub role: Role,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl Principal {
    pub fn new(id: Uuid, username: impl Into<String>, role: Role) -> Self {
        Self {
            id,
            username: username.into(),
            role,
            email: None,
            phone: None,
        }
    }

    pub fn with_contact(mut self, email: Option<String>, phone: Option<String>) -> Self {
        self.email = email;
        self.phone = phone;
        self
    }

    pub fn can(&self, capability: Capability) -> bool {
        self.role.allows(capability)
    }

    pub fn require(&self, capability: Capability, message: &str) -> Result<(), AppError> {
        if self.can(capability) {
            Ok(())
        } else {
            Err(AppError::Forbidden(message.to_string()))
        }
    }
}

/// Contact details held by the college's own student directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalRecord {
    pub username: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl ExternalRecord {
    /// True when either contact channel agrees with the principal's.
    pub fn matches(&self, principal: &Principal) -> bool {
        fn same(a: &Option<String>, b: &Option<String>) -> bool {
            match (a.as_deref(), b.as_deref()) {
                (Some(a), Some(b)) => !a.trim().is_empty() && a.trim() == b.trim(),
                _ => false,
            }
        }
        same(&self.email, &principal.email) || same(&self.phone, &principal.phone)
    }
}

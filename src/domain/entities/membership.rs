use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

/// Role a collaborator holds on a project.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, AsRefStr, Display,
    EnumString,
)]
#[sqlx(type_name = "project_role", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ProjectRole {
    Admin,
    Editor,
    Viewer,
}

/// Lifecycle of a membership row. A row starts as a pending invitation and is
/// resolved by the invited user; the role is only meaningful once accepted.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, AsRefStr, Display,
    EnumString,
)]
#[sqlx(type_name = "membership_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum MembershipStatus {
    Pending,
    Accepted,
    Declined,
}

impl MembershipStatus {
    /// Accepted and declined rows cannot transition again.
    pub fn is_resolved(&self) -> bool {
        !matches!(self, MembershipStatus::Pending)
    }
}

/// One row per (project, user); invitations and active grants share this type,
/// disambiguated by `status`.
#[derive(Debug, Clone)]
pub struct Membership {
    pub id: Uuid,
    pub project_id: Uuid,
    pub user_id: Uuid,
    pub role: ProjectRole,
    pub status: MembershipStatus,
    pub invited_by: Uuid,
    pub created_at: Option<chrono::NaiveDateTime>,
    pub updated_at: Option<chrono::NaiveDateTime>,
}

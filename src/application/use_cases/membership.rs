use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use crate::app_error::{AppError, AppResult};
use crate::application::use_cases::access::AccessResolver;
use crate::domain::entities::membership::{Membership, MembershipStatus, ProjectRole};
use crate::domain::entities::project::Project;
use crate::domain::entities::user::User;

/// Placeholder used when a best-effort enrichment lookup fails.
const UNKNOWN_IDENTITY: &str = "Unknown";

// ============================================================================
// Repository Traits
// ============================================================================

#[async_trait]
pub trait ProjectRepo: Send + Sync {
    async fn create(
        &self,
        owner_user_id: Uuid,
        name: &str,
        description: Option<&str>,
    ) -> AppResult<Project>;
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<Project>>;
}

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<User>>;
    async fn get_by_email(&self, email: &str) -> AppResult<Option<User>>;
}

/// Invitations and active grants share one table, so the store enforces no
/// transition rules of its own. Every transition below is a single conditional
/// statement: the expected prior state is part of the write, and a concurrent
/// mutation makes the write miss instead of clobbering.
#[async_trait]
pub trait MembershipRepo: Send + Sync {
    async fn get(&self, project_id: Uuid, user_id: Uuid) -> AppResult<Option<Membership>>;
    async fn list_by_project(&self, project_id: Uuid) -> AppResult<Vec<Membership>>;
    async fn list_pending_by_user(&self, user_id: Uuid) -> AppResult<Vec<Membership>>;
    /// Create a pending invitation, or reset a declined row back to pending.
    /// Returns `None` when a pending or accepted row already exists.
    async fn insert_invitation(
        &self,
        project_id: Uuid,
        user_id: Uuid,
        role: ProjectRole,
        invited_by: Uuid,
    ) -> AppResult<Option<Membership>>;
    /// Transition a pending row to accepted or declined. `None` when no
    /// pending row exists.
    async fn set_status_if_pending(
        &self,
        project_id: Uuid,
        user_id: Uuid,
        status: MembershipStatus,
    ) -> AppResult<Option<Membership>>;
    /// Change the role of an accepted row. `None` when no accepted row exists.
    async fn update_role_if_accepted(
        &self,
        project_id: Uuid,
        user_id: Uuid,
        role: ProjectRole,
    ) -> AppResult<Option<Membership>>;
    /// Returns whether a row was deleted.
    async fn delete(&self, project_id: Uuid, user_id: Uuid) -> AppResult<bool>;
}

// ============================================================================
// Profiles
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct MemberEntry {
    pub user_id: Uuid,
    pub email: String,
    pub role: ProjectRole,
    pub status: MembershipStatus,
    pub invited_by: Option<Uuid>,
    pub is_owner: bool,
    pub is_self: bool,
    pub created_at: Option<chrono::NaiveDateTime>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PendingInvitation {
    pub project_id: Uuid,
    pub project_name: String,
    pub project_description: Option<String>,
    pub role: ProjectRole,
    pub invited_by: String,
    pub created_at: Option<chrono::NaiveDateTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvitationReply {
    Accept,
    Decline,
}

// ============================================================================
// Use Cases
// ============================================================================

#[derive(Clone)]
pub struct MembershipUseCases {
    project_repo: Arc<dyn ProjectRepo>,
    membership_repo: Arc<dyn MembershipRepo>,
    user_repo: Arc<dyn UserRepo>,
    access: AccessResolver,
}

impl MembershipUseCases {
    pub fn new(
        project_repo: Arc<dyn ProjectRepo>,
        membership_repo: Arc<dyn MembershipRepo>,
        user_repo: Arc<dyn UserRepo>,
        access: AccessResolver,
    ) -> Self {
        Self {
            project_repo,
            membership_repo,
            user_repo,
            access,
        }
    }

    pub fn access(&self) -> &AccessResolver {
        &self.access
    }

    // ========================================================================
    // Projects
    // ========================================================================

    #[instrument(skip(self))]
    pub async fn create_project(
        &self,
        owner_user_id: Uuid,
        name: &str,
        description: Option<&str>,
    ) -> AppResult<Project> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::InvalidInput("Project name must not be empty".into()));
        }
        self.project_repo
            .create(owner_user_id, name, description)
            .await
    }

    /// Fetch a project together with the requester's effective role.
    #[instrument(skip(self))]
    pub async fn get_project(
        &self,
        project_id: Uuid,
        requester: Uuid,
    ) -> AppResult<(Project, ProjectRole)> {
        let (project, access) = self.access.resolve_project(project_id, requester).await?;
        let role = access.role().ok_or(AppError::Forbidden)?;
        Ok((project, role))
    }

    // ========================================================================
    // Invitations
    // ========================================================================

    /// Invite a user to a project. Only admins may invite; an existing pending
    /// or accepted row is a conflict, while a declined row is reopened.
    #[instrument(skip(self))]
    pub async fn invite(
        &self,
        project_id: Uuid,
        inviter: Uuid,
        invitee_email: &str,
        role: &str,
    ) -> AppResult<Membership> {
        let (project, access) = self.access.resolve_project(project_id, inviter).await?;
        if !access.is_admin() {
            return Err(AppError::Forbidden);
        }

        let role: ProjectRole = role
            .parse()
            .map_err(|_| AppError::InvalidInput(format!("Invalid role '{}'", role)))?;

        let invitee = self
            .user_repo
            .get_by_email(invitee_email)
            .await?
            .ok_or(AppError::NotFound)?;

        if invitee.id == project.owner_user_id {
            return Err(AppError::Conflict(
                "The project owner is already a member".into(),
            ));
        }

        self.membership_repo
            .insert_invitation(project_id, invitee.id, role, inviter)
            .await?
            .ok_or_else(|| {
                AppError::Conflict("An invitation or membership already exists for this user".into())
            })
    }

    /// Accept or decline an invitation. Only the invited user can respond, and
    /// only while the row is still pending; responding twice is NotFound
    /// because no pending row remains.
    #[instrument(skip(self))]
    pub async fn respond_to_invitation(
        &self,
        project_id: Uuid,
        responder: Uuid,
        reply: InvitationReply,
    ) -> AppResult<Membership> {
        let status = match reply {
            InvitationReply::Accept => MembershipStatus::Accepted,
            InvitationReply::Decline => MembershipStatus::Declined,
        };

        self.membership_repo
            .set_status_if_pending(project_id, responder, status)
            .await?
            .ok_or(AppError::NotFound)
    }

    /// Pending invitations for a user, enriched with project and inviter
    /// details. Enrichment is best-effort: a failed lookup degrades to a
    /// placeholder instead of failing the request.
    #[instrument(skip(self))]
    pub async fn list_pending_invitations(&self, user_id: Uuid) -> AppResult<Vec<PendingInvitation>> {
        let rows = self.membership_repo.list_pending_by_user(user_id).await?;

        let mut invitations = Vec::with_capacity(rows.len());
        for row in rows {
            let project = self.project_repo.get_by_id(row.project_id).await.ok().flatten();
            let inviter = self.user_repo.get_by_id(row.invited_by).await.ok().flatten();

            invitations.push(PendingInvitation {
                project_id: row.project_id,
                project_name: project
                    .as_ref()
                    .map(|p| p.name.clone())
                    .unwrap_or_else(|| UNKNOWN_IDENTITY.to_string()),
                project_description: project.and_then(|p| p.description),
                role: row.role,
                invited_by: inviter
                    .map(|u| u.display_identity().to_string())
                    .unwrap_or_else(|| UNKNOWN_IDENTITY.to_string()),
                created_at: row.created_at,
            });
        }

        Ok(invitations)
    }

    // ========================================================================
    // Members
    // ========================================================================

    /// All members of a project: every membership row plus the synthesized
    /// owner entry, sorted by creation time ascending.
    #[instrument(skip(self))]
    pub async fn list_members(&self, project_id: Uuid, requester: Uuid) -> AppResult<Vec<MemberEntry>> {
        let (project, access) = self.access.resolve_project(project_id, requester).await?;
        if !access.can_view() {
            return Err(AppError::Forbidden);
        }

        let rows = self.membership_repo.list_by_project(project_id).await?;

        let mut entries = Vec::with_capacity(rows.len() + 1);
        entries.push(MemberEntry {
            user_id: project.owner_user_id,
            email: self.email_of(project.owner_user_id).await,
            role: ProjectRole::Admin,
            status: MembershipStatus::Accepted,
            invited_by: None,
            is_owner: true,
            is_self: project.owner_user_id == requester,
            created_at: project.created_at,
        });
        for row in rows {
            entries.push(MemberEntry {
                user_id: row.user_id,
                email: self.email_of(row.user_id).await,
                role: row.role,
                status: row.status,
                invited_by: Some(row.invited_by),
                is_owner: false,
                is_self: row.user_id == requester,
                created_at: row.created_at,
            });
        }
        entries.sort_by_key(|e| e.created_at);

        Ok(entries)
    }

    /// Change an accepted member's role. Admin only; the owner's implicit role
    /// is immutable.
    #[instrument(skip(self))]
    pub async fn update_role(
        &self,
        project_id: Uuid,
        actor: Uuid,
        target: Uuid,
        new_role: &str,
    ) -> AppResult<Membership> {
        let (project, access) = self.access.resolve_project(project_id, actor).await?;
        if !access.is_admin() {
            return Err(AppError::Forbidden);
        }

        let role: ProjectRole = new_role
            .parse()
            .map_err(|_| AppError::InvalidInput(format!("Invalid role '{}'", new_role)))?;

        if target == project.owner_user_id {
            return Err(AppError::InvalidInput(
                "The project owner's role cannot be changed".into(),
            ));
        }

        match self
            .membership_repo
            .update_role_if_accepted(project_id, target, role)
            .await?
        {
            Some(membership) => Ok(membership),
            // Disambiguate the miss: pending/declined rows conflict, absent rows 404.
            None => match self.membership_repo.get(project_id, target).await? {
                Some(_) => Err(AppError::Conflict("Membership is not accepted".into())),
                None => Err(AppError::NotFound),
            },
        }
    }

    /// Remove a member. Admins may remove anyone but the owner; any member may
    /// remove themselves.
    #[instrument(skip(self))]
    pub async fn remove_member(&self, project_id: Uuid, actor: Uuid, target: Uuid) -> AppResult<()> {
        let (project, access) = self.access.resolve_project(project_id, actor).await?;

        if target == project.owner_user_id {
            return Err(AppError::InvalidInput(
                "The project owner cannot be removed".into(),
            ));
        }
        if actor != target && !access.is_admin() {
            return Err(AppError::Forbidden);
        }

        if !self.membership_repo.delete(project_id, target).await? {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    async fn email_of(&self, user_id: Uuid) -> String {
        self.user_repo
            .get_by_id(user_id)
            .await
            .ok()
            .flatten()
            .map(|u| u.email)
            .unwrap_or_else(|| UNKNOWN_IDENTITY.to_string())
    }
}

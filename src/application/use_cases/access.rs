use std::sync::Arc;

use uuid::Uuid;

use crate::app_error::{AppError, AppResult};
use crate::application::use_cases::membership::{MembershipRepo, ProjectRepo};
use crate::domain::entities::membership::{MembershipStatus, ProjectRole};
use crate::domain::entities::project::Project;

// ============================================================================
// Effective Access
// ============================================================================

/// Effective access a user holds on a project.
///
/// Ownership is implicit: the owner never has a membership row, so the
/// owner-as-admin rule lives here and nowhere else. A membership grants its
/// role only while accepted; pending and declined rows grant nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectAccess {
    Owner,
    Member(ProjectRole),
    None,
}

impl ProjectAccess {
    pub fn role(&self) -> Option<ProjectRole> {
        match self {
            ProjectAccess::Owner => Some(ProjectRole::Admin),
            ProjectAccess::Member(role) => Some(*role),
            ProjectAccess::None => None,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self.role(), Some(ProjectRole::Admin))
    }

    pub fn can_view(&self) -> bool {
        self.role().is_some()
    }
}

// ============================================================================
// Resolver
// ============================================================================

/// The single authorization primitive. Every mutation re-resolves through
/// here; results are never cached across requests, so role changes take
/// effect on the next action.
#[derive(Clone)]
pub struct AccessResolver {
    project_repo: Arc<dyn ProjectRepo>,
    membership_repo: Arc<dyn MembershipRepo>,
}

impl AccessResolver {
    pub fn new(project_repo: Arc<dyn ProjectRepo>, membership_repo: Arc<dyn MembershipRepo>) -> Self {
        Self {
            project_repo,
            membership_repo,
        }
    }

    /// Resolve the effective access for a user on an already-loaded project.
    pub async fn resolve(&self, project: &Project, user_id: Uuid) -> AppResult<ProjectAccess> {
        if project.owner_user_id == user_id {
            return Ok(ProjectAccess::Owner);
        }

        let membership = self.membership_repo.get(project.id, user_id).await?;
        Ok(match membership {
            Some(m) if m.status == MembershipStatus::Accepted => ProjectAccess::Member(m.role),
            _ => ProjectAccess::None,
        })
    }

    /// Load a project and resolve access in one step.
    pub async fn resolve_project(
        &self,
        project_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<(Project, ProjectAccess)> {
        let project = self
            .project_repo
            .get_by_id(project_id)
            .await?
            .ok_or(AppError::NotFound)?;
        let access = self.resolve(&project, user_id).await?;
        Ok((project, access))
    }
}

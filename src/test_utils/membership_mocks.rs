//! In-memory mock implementations for the membership repository traits.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::{
    app_error::AppResult,
    application::use_cases::membership::{MembershipRepo, ProjectRepo, UserRepo},
    domain::entities::{
        membership::{Membership, MembershipStatus, ProjectRole},
        project::Project,
        user::User,
    },
};

// ============================================================================
// InMemoryProjectRepo
// ============================================================================

#[derive(Default)]
pub struct InMemoryProjectRepo {
    pub projects: Mutex<HashMap<Uuid, Project>>,
}

impl InMemoryProjectRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_projects(projects: Vec<Project>) -> Self {
        let map: HashMap<Uuid, Project> = projects.into_iter().map(|p| (p.id, p)).collect();
        Self {
            projects: Mutex::new(map),
        }
    }
}

#[async_trait]
impl ProjectRepo for InMemoryProjectRepo {
    async fn create(
        &self,
        owner_user_id: Uuid,
        name: &str,
        description: Option<&str>,
    ) -> AppResult<Project> {
        let project = Project {
            id: Uuid::new_v4(),
            owner_user_id,
            name: name.to_string(),
            description: description.map(|d| d.to_string()),
            created_at: Some(chrono::Utc::now().naive_utc()),
        };
        self.projects
            .lock()
            .unwrap()
            .insert(project.id, project.clone());
        Ok(project)
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<Project>> {
        Ok(self.projects.lock().unwrap().get(&id).cloned())
    }
}

// ============================================================================
// InMemoryUserRepo
// ============================================================================

#[derive(Default)]
pub struct InMemoryUserRepo {
    pub users: Mutex<HashMap<Uuid, User>>,
}

impl InMemoryUserRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users(users: Vec<User>) -> Self {
        let map: HashMap<Uuid, User> = users.into_iter().map(|u| (u.id, u)).collect();
        Self {
            users: Mutex::new(map),
        }
    }
}

#[async_trait]
impl UserRepo for InMemoryUserRepo {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<User>> {
        Ok(self.users.lock().unwrap().get(&id).cloned())
    }

    async fn get_by_email(&self, email: &str) -> AppResult<Option<User>> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }
}

// ============================================================================
// InMemoryMembershipRepo
// ============================================================================

/// Mirrors the conditional-write semantics of the Postgres implementation
/// under a single mutex, so state-machine tests exercise the same guards.
#[derive(Default)]
pub struct InMemoryMembershipRepo {
    pub rows: Mutex<HashMap<(Uuid, Uuid), Membership>>,
}

impl InMemoryMembershipRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_memberships(memberships: Vec<Membership>) -> Self {
        let map: HashMap<(Uuid, Uuid), Membership> = memberships
            .into_iter()
            .map(|m| ((m.project_id, m.user_id), m))
            .collect();
        Self {
            rows: Mutex::new(map),
        }
    }

    /// Insert a row directly, bypassing the invitation flow.
    pub fn seed(&self, membership: Membership) {
        self.rows
            .lock()
            .unwrap()
            .insert((membership.project_id, membership.user_id), membership);
    }
}

#[async_trait]
impl MembershipRepo for InMemoryMembershipRepo {
    async fn get(&self, project_id: Uuid, user_id: Uuid) -> AppResult<Option<Membership>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .get(&(project_id, user_id))
            .cloned())
    }

    async fn list_by_project(&self, project_id: Uuid) -> AppResult<Vec<Membership>> {
        let mut rows: Vec<Membership> = self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|m| m.project_id == project_id)
            .cloned()
            .collect();
        rows.sort_by_key(|m| m.created_at);
        Ok(rows)
    }

    async fn list_pending_by_user(&self, user_id: Uuid) -> AppResult<Vec<Membership>> {
        let mut rows: Vec<Membership> = self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|m| m.user_id == user_id && m.status == MembershipStatus::Pending)
            .cloned()
            .collect();
        rows.sort_by_key(|m| std::cmp::Reverse(m.created_at));
        Ok(rows)
    }

    async fn insert_invitation(
        &self,
        project_id: Uuid,
        user_id: Uuid,
        role: ProjectRole,
        invited_by: Uuid,
    ) -> AppResult<Option<Membership>> {
        let mut rows = self.rows.lock().unwrap();
        let now = chrono::Utc::now().naive_utc();

        match rows.get_mut(&(project_id, user_id)) {
            Some(existing) if existing.status == MembershipStatus::Declined => {
                existing.role = role;
                existing.status = MembershipStatus::Pending;
                existing.invited_by = invited_by;
                existing.updated_at = Some(now);
                Ok(Some(existing.clone()))
            }
            Some(_) => Ok(None),
            None => {
                let membership = Membership {
                    id: Uuid::new_v4(),
                    project_id,
                    user_id,
                    role,
                    status: MembershipStatus::Pending,
                    invited_by,
                    created_at: Some(now),
                    updated_at: Some(now),
                };
                rows.insert((project_id, user_id), membership.clone());
                Ok(Some(membership))
            }
        }
    }

    async fn set_status_if_pending(
        &self,
        project_id: Uuid,
        user_id: Uuid,
        status: MembershipStatus,
    ) -> AppResult<Option<Membership>> {
        let mut rows = self.rows.lock().unwrap();
        match rows.get_mut(&(project_id, user_id)) {
            Some(existing) if existing.status == MembershipStatus::Pending => {
                existing.status = status;
                existing.updated_at = Some(chrono::Utc::now().naive_utc());
                Ok(Some(existing.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn update_role_if_accepted(
        &self,
        project_id: Uuid,
        user_id: Uuid,
        role: ProjectRole,
    ) -> AppResult<Option<Membership>> {
        let mut rows = self.rows.lock().unwrap();
        match rows.get_mut(&(project_id, user_id)) {
            Some(existing) if existing.status == MembershipStatus::Accepted => {
                existing.role = role;
                existing.updated_at = Some(chrono::Utc::now().naive_utc());
                Ok(Some(existing.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn delete(&self, project_id: Uuid, user_id: Uuid) -> AppResult<bool> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .remove(&(project_id, user_id))
            .is_some())
    }
}

use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::HeaderMap,
    response::IntoResponse,
    routing::{get, patch, post},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    adapters::http::app_state::AppState,
    adapters::http::routes::{current_user, json_body},
    app_error::AppResult,
    application::use_cases::membership::{InvitationReply, MemberEntry},
    domain::entities::membership::Membership,
    domain::entities::project::Project,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_project))
        .route("/{id}", get(get_project))
        .route("/{id}/invitations", post(invite_member))
        .route("/{id}/invitations/respond", post(respond_to_invitation))
        .route("/{id}/members", get(list_members))
        .route(
            "/{id}/members/{user_id}",
            patch(update_member_role).delete(remove_member),
        )
}

// ============================================================================
// Bodies
// ============================================================================

#[derive(Serialize)]
struct ProjectBody {
    id: Uuid,
    owner_user_id: Uuid,
    name: String,
    description: Option<String>,
    created_at: Option<chrono::NaiveDateTime>,
}

impl From<Project> for ProjectBody {
    fn from(project: Project) -> Self {
        Self {
            id: project.id,
            owner_user_id: project.owner_user_id,
            name: project.name,
            description: project.description,
            created_at: project.created_at,
        }
    }
}

#[derive(Serialize)]
struct MembershipBody {
    project_id: Uuid,
    user_id: Uuid,
    role: crate::domain::entities::membership::ProjectRole,
    status: crate::domain::entities::membership::MembershipStatus,
}

impl From<Membership> for MembershipBody {
    fn from(membership: Membership) -> Self {
        Self {
            project_id: membership.project_id,
            user_id: membership.user_id,
            role: membership.role,
            status: membership.status,
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

#[derive(Deserialize)]
struct CreateProjectRequest {
    name: String,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Serialize)]
struct CreateProjectResponse {
    success: bool,
    project: ProjectBody,
}

async fn create_project(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<CreateProjectRequest>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let user_id = current_user(&headers, &app_state)?;
    let req = json_body(payload)?;

    let project = app_state
        .membership_use_cases
        .create_project(user_id, &req.name, req.description.as_deref())
        .await?;

    Ok(Json(CreateProjectResponse {
        success: true,
        project: project.into(),
    }))
}

#[derive(Serialize)]
struct GetProjectResponse {
    success: bool,
    project: ProjectBody,
    role: crate::domain::entities::membership::ProjectRole,
}

async fn get_project(
    State(app_state): State<AppState>,
    Path(project_id): Path<Uuid>,
    headers: HeaderMap,
) -> AppResult<impl IntoResponse> {
    let user_id = current_user(&headers, &app_state)?;

    let (project, role) = app_state
        .membership_use_cases
        .get_project(project_id, user_id)
        .await?;

    Ok(Json(GetProjectResponse {
        success: true,
        project: project.into(),
        role,
    }))
}

#[derive(Deserialize)]
struct InviteRequest {
    email: String,
    role: String,
}

#[derive(Serialize)]
struct MembershipResponse {
    success: bool,
    membership: MembershipBody,
}

async fn invite_member(
    State(app_state): State<AppState>,
    Path(project_id): Path<Uuid>,
    headers: HeaderMap,
    payload: Result<Json<InviteRequest>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let user_id = current_user(&headers, &app_state)?;
    let req = json_body(payload)?;

    let membership = app_state
        .membership_use_cases
        .invite(project_id, user_id, &req.email, &req.role)
        .await?;

    Ok(Json(MembershipResponse {
        success: true,
        membership: membership.into(),
    }))
}

#[derive(Deserialize)]
struct RespondRequest {
    action: InvitationReply,
}

async fn respond_to_invitation(
    State(app_state): State<AppState>,
    Path(project_id): Path<Uuid>,
    headers: HeaderMap,
    payload: Result<Json<RespondRequest>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let user_id = current_user(&headers, &app_state)?;
    let req = json_body(payload)?;

    let membership = app_state
        .membership_use_cases
        .respond_to_invitation(project_id, user_id, req.action)
        .await?;

    Ok(Json(MembershipResponse {
        success: true,
        membership: membership.into(),
    }))
}

#[derive(Serialize)]
struct MembersResponse {
    success: bool,
    members: Vec<MemberEntry>,
}

async fn list_members(
    State(app_state): State<AppState>,
    Path(project_id): Path<Uuid>,
    headers: HeaderMap,
) -> AppResult<impl IntoResponse> {
    let user_id = current_user(&headers, &app_state)?;

    let members = app_state
        .membership_use_cases
        .list_members(project_id, user_id)
        .await?;

    Ok(Json(MembersResponse {
        success: true,
        members,
    }))
}

#[derive(Deserialize)]
struct UpdateRoleRequest {
    role: String,
}

async fn update_member_role(
    State(app_state): State<AppState>,
    Path((project_id, target_user_id)): Path<(Uuid, Uuid)>,
    headers: HeaderMap,
    payload: Result<Json<UpdateRoleRequest>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let user_id = current_user(&headers, &app_state)?;
    let req = json_body(payload)?;

    let membership = app_state
        .membership_use_cases
        .update_role(project_id, user_id, target_user_id, &req.role)
        .await?;

    Ok(Json(MembershipResponse {
        success: true,
        membership: membership.into(),
    }))
}

#[derive(Serialize)]
struct RemoveMemberResponse {
    success: bool,
}

async fn remove_member(
    State(app_state): State<AppState>,
    Path((project_id, target_user_id)): Path<(Uuid, Uuid)>,
    headers: HeaderMap,
) -> AppResult<impl IntoResponse> {
    let user_id = current_user(&headers, &app_state)?;

    app_state
        .membership_use_cases
        .remove_member(project_id, user_id, target_user_id)
        .await?;

    Ok(Json(RemoveMemberResponse { success: true }))
}

// ============================================================================
// Tests
// ============================================================================

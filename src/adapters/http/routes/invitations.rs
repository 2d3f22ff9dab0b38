use axum::{
    Json, Router, extract::State, http::HeaderMap, response::IntoResponse, routing::get,
};
use serde::Serialize;

use crate::{
    adapters::http::app_state::AppState, adapters::http::routes::current_user,
    app_error::AppResult, application::use_cases::membership::PendingInvitation,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(list_pending_invitations))
}

#[derive(Serialize)]
struct InvitationsResponse {
    success: bool,
    invitations: Vec<PendingInvitation>,
}

/// Pending invitations addressed to the authenticated user.
async fn list_pending_invitations(
    State(app_state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<impl IntoResponse> {
    let user_id = current_user(&headers, &app_state)?;

    let invitations = app_state
        .membership_use_cases
        .list_pending_invitations(user_id)
        .await?;

    Ok(Json(InvitationsResponse {
        success: true,
        invitations,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum_test::TestServer;
    use serde_json::{Value, json};

    use crate::test_utils::{
        TestAppStateBuilder, create_test_project, create_test_user, test_bearer_token,
    };

    fn build_test_server(app_state: AppState) -> TestServer {
        TestServer::new(super::super::router().with_state(app_state)).unwrap()
    }

    #[tokio::test]
    async fn listing_requires_authentication() {
        let app_state = TestAppStateBuilder::new().build();
        let server = build_test_server(app_state);

        let response = server.get("/invitations").await;
        response.assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn pending_invitations_include_project_and_inviter() {
        let owner = create_test_user(|u| u.email = "owner@example.com".to_string());
        let invitee = create_test_user(|u| u.email = "new@example.com".to_string());
        let project = create_test_project(owner.id, |p| p.name = "Roadmap".to_string());

        let app_state = TestAppStateBuilder::new()
            .with_user(owner.clone())
            .with_user(invitee.clone())
            .with_project(project.clone())
            .build();
        let server = build_test_server(app_state);

        server
            .post(&format!("/projects/{}/invitations", project.id))
            .authorization_bearer(&test_bearer_token(owner.id))
            .json(&json!({"email": "new@example.com", "role": "viewer"}))
            .await
            .assert_status_ok();

        let response = server
            .get("/invitations")
            .authorization_bearer(&test_bearer_token(invitee.id))
            .await;
        response.assert_status_ok();

        let body: Value = response.json();
        let invitations = body["invitations"].as_array().unwrap();
        assert_eq!(invitations.len(), 1);
        assert_eq!(invitations[0]["project_name"], json!("Roadmap"));
        assert_eq!(invitations[0]["invited_by"], json!("owner@example.com"));
        assert_eq!(invitations[0]["role"], json!("viewer"));
    }

    #[tokio::test]
    async fn user_without_invitations_gets_empty_list() {
        let user = create_test_user(|_| {});
        let app_state = TestAppStateBuilder::new().with_user(user.clone()).build();
        let server = build_test_server(app_state);

        let response = server
            .get("/invitations")
            .authorization_bearer(&test_bearer_token(user.id))
            .await;
        response.assert_status_ok();

        let body: Value = response.json();
        assert_eq!(body["success"], json!(true));
        assert!(body["invitations"].as_array().unwrap().is_empty());
    }
}

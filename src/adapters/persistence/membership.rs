use async_trait::async_trait;
use sqlx::Row;
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::membership::MembershipRepo,
    domain::entities::membership::{Membership, MembershipStatus, ProjectRole},
};

fn row_to_membership(row: &sqlx::postgres::PgRow) -> Membership {
    Membership {
        id: row.get("id"),
        project_id: row.get("project_id"),
        user_id: row.get("user_id"),
        role: row.get("role"),
        status: row.get("status"),
        invited_by: row.get("invited_by"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

const SELECT_COLS: &str = "id, project_id, user_id, role, status, invited_by, created_at, updated_at";

#[async_trait]
impl MembershipRepo for PostgresPersistence {
    async fn get(&self, project_id: Uuid, user_id: Uuid) -> AppResult<Option<Membership>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM memberships WHERE project_id = $1 AND user_id = $2",
            SELECT_COLS
        ))
        .bind(project_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;

        Ok(row.as_ref().map(row_to_membership))
    }

    async fn list_by_project(&self, project_id: Uuid) -> AppResult<Vec<Membership>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM memberships WHERE project_id = $1 ORDER BY created_at ASC",
            SELECT_COLS
        ))
        .bind(project_id)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::from)?;

        Ok(rows.iter().map(row_to_membership).collect())
    }

    async fn list_pending_by_user(&self, user_id: Uuid) -> AppResult<Vec<Membership>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM memberships WHERE user_id = $1 AND status = 'pending' ORDER BY created_at DESC",
            SELECT_COLS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::from)?;

        Ok(rows.iter().map(row_to_membership).collect())
    }

    async fn insert_invitation(
        &self,
        project_id: Uuid,
        user_id: Uuid,
        role: ProjectRole,
        invited_by: Uuid,
    ) -> AppResult<Option<Membership>> {
        let id = Uuid::new_v4();
        // The conflict arm only fires for declined rows; a pending or accepted
        // row makes the statement return nothing, which the caller reports as
        // a conflict. This keeps invite racing invite safe without a lock.
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO memberships (id, project_id, user_id, role, status, invited_by)
            VALUES ($1, $2, $3, $4, 'pending', $5)
            ON CONFLICT (project_id, user_id) DO UPDATE SET
                role = EXCLUDED.role,
                status = 'pending',
                invited_by = EXCLUDED.invited_by,
                updated_at = CURRENT_TIMESTAMP
            WHERE memberships.status = 'declined'
            RETURNING {}
            "#,
            SELECT_COLS
        ))
        .bind(id)
        .bind(project_id)
        .bind(user_id)
        .bind(role)
        .bind(invited_by)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;

        Ok(row.as_ref().map(row_to_membership))
    }

    async fn set_status_if_pending(
        &self,
        project_id: Uuid,
        user_id: Uuid,
        status: MembershipStatus,
    ) -> AppResult<Option<Membership>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE memberships SET
                status = $3,
                updated_at = CURRENT_TIMESTAMP
            WHERE project_id = $1 AND user_id = $2 AND status = 'pending'
            RETURNING {}
            "#,
            SELECT_COLS
        ))
        .bind(project_id)
        .bind(user_id)
        .bind(status)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;

        Ok(row.as_ref().map(row_to_membership))
    }

    async fn update_role_if_accepted(
        &self,
        project_id: Uuid,
        user_id: Uuid,
        role: ProjectRole,
    ) -> AppResult<Option<Membership>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE memberships SET
                role = $3,
                updated_at = CURRENT_TIMESTAMP
            WHERE project_id = $1 AND user_id = $2 AND status = 'accepted'
            RETURNING {}
            "#,
            SELECT_COLS
        ))
        .bind(project_id)
        .bind(user_id)
        .bind(role)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;

        Ok(row.as_ref().map(row_to_membership))
    }

    async fn delete(&self, project_id: Uuid, user_id: Uuid) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM memberships WHERE project_id = $1 AND user_id = $2")
            .bind(project_id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(AppError::from)?;

        Ok(result.rows_affected() > 0)
    }
}

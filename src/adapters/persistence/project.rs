use async_trait::async_trait;
use sqlx::Row;
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::membership::ProjectRepo,
    domain::entities::project::Project,
};

fn row_to_project(row: &sqlx::postgres::PgRow) -> Project {
    Project {
        id: row.get("id"),
        owner_user_id: row.get("owner_user_id"),
        name: row.get("name"),
        description: row.get("description"),
        created_at: row.get("created_at"),
    }
}

const SELECT_COLS: &str = "id, owner_user_id, name, description, created_at";

#[async_trait]
impl ProjectRepo for PostgresPersistence {
    async fn create(
        &self,
        owner_user_id: Uuid,
        name: &str,
        description: Option<&str>,
    ) -> AppResult<Project> {
        let id = Uuid::new_v4();
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO projects (id, owner_user_id, name, description)
            VALUES ($1, $2, $3, $4)
            RETURNING {}
            "#,
            SELECT_COLS
        ))
        .bind(id)
        .bind(owner_user_id)
        .bind(name)
        .bind(description)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::from)?;

        Ok(row_to_project(&row))
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<Project>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM projects WHERE id = $1",
            SELECT_COLS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;

        Ok(row.as_ref().map(row_to_project))
    }
}

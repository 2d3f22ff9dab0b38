use async_trait::async_trait;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::billing::BillingEventRepo,
    domain::entities::subscription::BillingProvider,
};

#[async_trait]
impl BillingEventRepo for PostgresPersistence {
    async fn try_record(&self, provider: BillingProvider, event_id: &str) -> AppResult<bool> {
        // Concurrent deliveries of the same event race on this insert; exactly
        // one of them sees rows_affected = 1 and gets to apply the event.
        let result = sqlx::query(
            r#"
            INSERT INTO billing_events (provider, provider_event_id)
            VALUES ($1, $2)
            ON CONFLICT (provider, provider_event_id) DO NOTHING
            "#,
        )
        .bind(provider)
        .bind(event_id)
        .execute(&self.pool)
        .await
        .map_err(AppError::from)?;

        Ok(result.rows_affected() > 0)
    }
}

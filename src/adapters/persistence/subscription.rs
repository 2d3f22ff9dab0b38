use async_trait::async_trait;
use sqlx::Row;
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::billing::{
        SubscriptionRepo, SubscriptionUpdate, SubscriptionUpsert, WriteOutcome,
    },
    domain::entities::subscription::{BillingProvider, Subscription},
};

fn row_to_subscription(row: &sqlx::postgres::PgRow) -> Subscription {
    Subscription {
        user_id: row.get("user_id"),
        plan: row.get("plan"),
        status: row.get("status"),
        stripe_customer_id: row.get("stripe_customer_id"),
        stripe_subscription_id: row.get("stripe_subscription_id"),
        revenuecat_app_user_id: row.get("revenuecat_app_user_id"),
        current_period_end: row.get("current_period_end"),
        cancel_at_period_end: row.get("cancel_at_period_end"),
        last_event_source: row.get::<Option<BillingProvider>, _>("last_event_source"),
        last_event_at: row.get("last_event_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

const SELECT_COLS: &str = r#"
    user_id, plan, status, stripe_customer_id, stripe_subscription_id,
    revenuecat_app_user_id, current_period_end, cancel_at_period_end,
    last_event_source, last_event_at, created_at, updated_at
"#;

#[async_trait]
impl SubscriptionRepo for PostgresPersistence {
    async fn get_by_user(&self, user_id: Uuid) -> AppResult<Option<Subscription>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM subscriptions WHERE user_id = $1",
            SELECT_COLS
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(row.as_ref().map(row_to_subscription))
    }

    async fn get_by_stripe_customer_id(
        &self,
        customer_id: &str,
    ) -> AppResult<Option<Subscription>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM subscriptions WHERE stripe_customer_id = $1",
            SELECT_COLS
        ))
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(row.as_ref().map(row_to_subscription))
    }

    async fn upsert_if_newer(&self, input: &SubscriptionUpsert) -> AppResult<WriteOutcome> {
        // The ordering guard is part of the statement: the conflict arm only
        // fires when the stored record is older than the incoming event.
        // Provider references merge so one provider never unlinks the other.
        let result = sqlx::query(
            r#"
            INSERT INTO subscriptions
                (user_id, plan, status, stripe_customer_id, stripe_subscription_id,
                 revenuecat_app_user_id, current_period_end, cancel_at_period_end,
                 last_event_source, last_event_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (user_id) DO UPDATE SET
                plan = EXCLUDED.plan,
                status = EXCLUDED.status,
                stripe_customer_id = COALESCE(EXCLUDED.stripe_customer_id, subscriptions.stripe_customer_id),
                stripe_subscription_id = COALESCE(EXCLUDED.stripe_subscription_id, subscriptions.stripe_subscription_id),
                revenuecat_app_user_id = COALESCE(EXCLUDED.revenuecat_app_user_id, subscriptions.revenuecat_app_user_id),
                current_period_end = EXCLUDED.current_period_end,
                cancel_at_period_end = EXCLUDED.cancel_at_period_end,
                last_event_source = EXCLUDED.last_event_source,
                last_event_at = EXCLUDED.last_event_at,
                updated_at = CURRENT_TIMESTAMP
            WHERE subscriptions.last_event_at IS NULL
               OR subscriptions.last_event_at < EXCLUDED.last_event_at
            "#,
        )
        .bind(input.user_id)
        .bind(input.plan)
        .bind(input.status)
        .bind(&input.stripe_customer_id)
        .bind(&input.stripe_subscription_id)
        .bind(&input.revenuecat_app_user_id)
        .bind(input.current_period_end)
        .bind(input.cancel_at_period_end)
        .bind(input.source)
        .bind(input.event_at)
        .execute(&self.pool)
        .await
        .map_err(AppError::from)?;

        Ok(if result.rows_affected() > 0 {
            WriteOutcome::Applied
        } else {
            WriteOutcome::Stale
        })
    }

    async fn update_by_stripe_subscription_id_if_newer(
        &self,
        stripe_subscription_id: &str,
        update: &SubscriptionUpdate,
    ) -> AppResult<WriteOutcome> {
        let result = sqlx::query(
            r#"
            UPDATE subscriptions SET
                plan = COALESCE($2, plan),
                status = $3,
                current_period_end = COALESCE($4, current_period_end),
                cancel_at_period_end = COALESCE($5, cancel_at_period_end),
                last_event_source = $6,
                last_event_at = $7,
                updated_at = CURRENT_TIMESTAMP
            WHERE stripe_subscription_id = $1
              AND (last_event_at IS NULL OR last_event_at < $7)
            "#,
        )
        .bind(stripe_subscription_id)
        .bind(update.plan)
        .bind(update.status)
        .bind(update.current_period_end)
        .bind(update.cancel_at_period_end)
        .bind(update.source)
        .bind(update.event_at)
        .execute(&self.pool)
        .await
        .map_err(AppError::from)?;

        if result.rows_affected() > 0 {
            return Ok(WriteOutcome::Applied);
        }

        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM subscriptions WHERE stripe_subscription_id = $1)",
        )
        .bind(stripe_subscription_id)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::from)?;

        Ok(if exists {
            WriteOutcome::Stale
        } else {
            WriteOutcome::Missing
        })
    }

    async fn update_by_user_if_newer(
        &self,
        user_id: Uuid,
        update: &SubscriptionUpdate,
    ) -> AppResult<WriteOutcome> {
        let result = sqlx::query(
            r#"
            UPDATE subscriptions SET
                plan = COALESCE($2, plan),
                status = $3,
                current_period_end = COALESCE($4, current_period_end),
                cancel_at_period_end = COALESCE($5, cancel_at_period_end),
                last_event_source = $6,
                last_event_at = $7,
                updated_at = CURRENT_TIMESTAMP
            WHERE user_id = $1
              AND (last_event_at IS NULL OR last_event_at < $7)
            "#,
        )
        .bind(user_id)
        .bind(update.plan)
        .bind(update.status)
        .bind(update.current_period_end)
        .bind(update.cancel_at_period_end)
        .bind(update.source)
        .bind(update.event_at)
        .execute(&self.pool)
        .await
        .map_err(AppError::from)?;

        if result.rows_affected() > 0 {
            return Ok(WriteOutcome::Applied);
        }

        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM subscriptions WHERE user_id = $1)")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await
                .map_err(AppError::from)?;

        Ok(if exists {
            WriteOutcome::Stale
        } else {
            WriteOutcome::Missing
        })
    }
}

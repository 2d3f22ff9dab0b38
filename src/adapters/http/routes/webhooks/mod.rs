//! Machine-to-machine webhook endpoints. These skip bearer authentication and
//! authenticate the provider by signature instead; once a request is verified,
//! it is always acknowledged with 200 so the provider stops redelivering, even
//! when the store update fails. Failures are logged for out-of-band monitoring.

pub mod revenuecat;
pub mod stripe;

use axum::Router;

use crate::adapters::http::app_state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(stripe::router())
        .merge(revenuecat::router())
}

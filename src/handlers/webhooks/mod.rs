pub mod common;
pub mod paystack;
pub mod stripe;

pub use paystack::handle_paystack_webhook;
pub use stripe::handle_stripe_webhook;

use axum::{routing::post, Router};

use crate::db::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/webhook/stripe", post(handle_stripe_webhook))
        .route("/webhook/paystack", post(handle_paystack_webhook))
}

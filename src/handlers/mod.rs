pub mod admin;
pub mod realtors;
pub mod refunds;
pub mod webhooks;

use serde::{Deserialize, Serialize};

/// Host record, reduced to the payout-relevant surface. Profile management
/// lives outside this core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Realtor {
    pub id: String,
    pub name: String,
    pub email: String,
    /// Stripe Connect account (acct_xxx) once onboarding has started.
    pub stripe_account_id: Option<String>,
    /// Paystack subaccount code; charges split natively at capture time.
    pub paystack_subaccount_code: Option<String>,
    /// Mirrors the gateway's payouts_enabled flag; refreshed from
    /// account.updated webhooks and the connect status endpoint.
    pub payouts_enabled: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateRealtor {
    pub name: String,
    pub email: String,
}

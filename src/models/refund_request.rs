use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Two-stage refund claim: the realtor rules on the request first, then an
/// admin executes the gateway refund. Terminal at Completed or RealtorRejected.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RefundRequestStatus {
    PendingRealtorApproval,
    RealtorApproved,
    RealtorRejected,
    AdminProcessing,
    Completed,
}

impl RefundRequestStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RefundRequestStatus::Completed | RefundRequestStatus::RealtorRejected
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundRequest {
    pub id: String,
    pub booking_id: String,
    pub payment_id: String,
    /// Guest id that filed the claim.
    pub requested_by: String,
    /// Amount fixed at request time; the admin stage may not exceed it.
    pub amount_minor: i64,
    pub currency: String,
    pub reason: String,
    pub status: RefundRequestStatus,

    pub realtor_decided_at: Option<i64>,
    pub realtor_note: Option<String>,

    pub admin_id: Option<String>,
    pub admin_processed_at: Option<i64>,
    /// What the gateway actually refunded.
    pub actual_amount_minor: Option<i64>,
    pub provider_refund_id: Option<String>,

    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateRefundRequest {
    pub requested_by: String,
    pub amount_minor: i64,
    pub reason: String,
}

/// Append-only refund audit trail per payment. One entry per refund the
/// gateway actually executed, regardless of which flow triggered it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundEntry {
    pub id: String,
    pub payment_id: String,
    pub refund_request_id: Option<String>,
    pub provider_refund_id: String,
    pub amount_minor: i64,
    pub created_at: i64,
}

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::gateways::PaymentGateway;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    /// Fully refunded. Partial refunds leave the payment Completed with a
    /// non-zero refund running total.
    Refunded,
}

/// The monetary transaction tied 1:1 to a booking. All amounts are integer
/// minor units (cents/kobo); major-unit rendering happens only at the
/// presentation edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: String,
    pub booking_id: String,
    pub amount_minor: i64,
    pub currency: String,
    pub status: PaymentStatus,
    /// Running refund total. Never exceeds amount_minor.
    pub refund_amount_minor: i64,

    pub gateway: PaymentGateway,
    /// Stripe payment intent id / Paystack transaction id.
    pub gateway_transaction_id: Option<String>,
    /// Paystack charge reference (also used as the fee-lookup key there).
    pub gateway_reference: Option<String>,
    /// Stripe transfer id / Paystack transfer code once a payout exists.
    pub gateway_transfer_id: Option<String>,

    /// Processor's cut, known only after the charge settles.
    pub gateway_fee_minor: Option<i64>,
    /// service fee + platform commission - gateway fee.
    pub platform_net_minor: Option<i64>,
    pub service_fee_minor: i64,
    pub platform_commission_minor: i64,

    pub payout_released: bool,
    pub payout_released_at: Option<i64>,

    pub created_at: i64,
    pub updated_at: i64,
}

impl Payment {
    /// Amount still refundable against this payment.
    pub fn available_for_refund_minor(&self) -> i64 {
        self.amount_minor - self.refund_amount_minor
    }
}

/// Data required to create a payment alongside its booking.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePayment {
    pub booking_id: String,
    pub amount_minor: i64,
    pub currency: String,
    pub gateway: PaymentGateway,
    pub service_fee_minor: i64,
    pub platform_commission_minor: i64,
}

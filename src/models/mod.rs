mod audit_log;
mod booking;
mod payment;
mod realtor;
mod refund_request;

pub use audit_log::{ActorType, AuditAction, AuditLog};
pub use booking::{Booking, BookingStatus, CreateBooking, PayoutStatus, TransitionExtras};
pub use payment::{CreatePayment, Payment, PaymentStatus};
pub use realtor::{CreateRealtor, Realtor};
pub use refund_request::{CreateRefundRequest, RefundEntry, RefundRequest, RefundRequestStatus};

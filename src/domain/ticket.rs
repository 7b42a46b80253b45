use super::identity::UserId;
use super::money::Amount;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RouteId(pub i64);

/// Groups the tickets created from one purchase request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(pub String);

impl BatchId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Payment reference shared by every ticket of the batch. Also used as
    /// the gateway transaction id, so it must be stable across redeliveries.
    pub fn payment_reference(&self) -> String {
        format!("TICKET-{}", self.0)
    }

    /// Ledger reference of the wallet debit that paid for the batch.
    pub fn ledger_reference(&self) -> String {
        format!("purchase:{}", self.0)
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for RouteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Wallet,
    Gateway,
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentMethod::Wallet => f.write_str("wallet"),
            PaymentMethod::Gateway => f.write_str("gateway"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Cancelled,
}

/// A ticket as persisted by the `TicketStore`.
///
/// `checked` goes from `false` to `true` exactly once, and `cancelled_at` is
/// set at most once while `checked` is still `false`. Both transitions are
/// performed by the store itself, never by a caller mutating this struct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    pub user_id: UserId,
    pub route_id: RouteId,
    pub bus_name: String,
    pub start_destination: String,
    pub end_destination: String,
    pub fare: Amount,
    pub paid_status: bool,
    pub checked: bool,
    pub qr_code: String,
    pub created_at: DateTime<Utc>,
    pub batch_id: BatchId,
    pub payment_method: PaymentMethod,
    pub payment_reference: String,
    pub payment_used: bool,
    pub payment_status: PaymentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Ticket {
    pub fn is_cancelled(&self) -> bool {
        self.cancelled_at.is_some()
    }

    /// Compare-and-set on `checked`; stores call this under their write lock.
    pub fn try_check(&mut self) -> bool {
        if self.checked || self.is_cancelled() {
            return false;
        }
        self.checked = true;
        true
    }

    pub fn try_cancel(&mut self, at: DateTime<Utc>) -> bool {
        if self.checked || self.is_cancelled() {
            return false;
        }
        self.cancelled_at = Some(at);
        true
    }
}

/// Applies `outcome` to all members of a batch; returns how many changed.
///
/// A batch whose payment has already been used is left alone, which makes
/// repeated gateway callbacks harmless.
pub fn apply_batch_payment(batch: &mut [Ticket], outcome: BatchPayment) -> usize {
    if batch.iter().any(|ticket| ticket.payment_used) {
        return 0;
    }
    for ticket in batch.iter_mut() {
        match outcome {
            BatchPayment::Confirmed => {
                ticket.paid_status = true;
                ticket.payment_used = true;
                ticket.payment_status = PaymentStatus::Paid;
            }
            BatchPayment::Failed => ticket.payment_status = PaymentStatus::Failed,
            BatchPayment::Cancelled => ticket.payment_status = PaymentStatus::Cancelled,
        }
    }
    batch.len()
}

/// A ticket row before the store has assigned it an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTicket {
    pub user_id: UserId,
    pub route_id: RouteId,
    pub bus_name: String,
    pub start_destination: String,
    pub end_destination: String,
    pub fare: Amount,
    pub paid_status: bool,
    pub qr_code: String,
    pub created_at: DateTime<Utc>,
    pub batch_id: BatchId,
    pub payment_method: PaymentMethod,
    pub payment_reference: String,
    pub payment_used: bool,
    pub payment_status: PaymentStatus,
}

impl NewTicket {
    pub fn into_ticket(self, id: TicketId) -> Ticket {
        Ticket {
            id,
            user_id: self.user_id,
            route_id: self.route_id,
            bus_name: self.bus_name,
            start_destination: self.start_destination,
            end_destination: self.end_destination,
            fare: self.fare,
            paid_status: self.paid_status,
            checked: false,
            qr_code: self.qr_code,
            created_at: self.created_at,
            batch_id: self.batch_id,
            payment_method: self.payment_method,
            payment_reference: self.payment_reference,
            payment_used: self.payment_used,
            payment_status: self.payment_status,
            cancelled_at: None,
        }
    }
}

/// Outcome applied to every ticket of a batch by the reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchPayment {
    /// Gateway confirmed the payment: paid, used, status `paid`.
    Confirmed,
    /// Gateway reported failure: status `failed` only.
    Failed,
    /// Purchaser cancelled at the gateway: status `cancelled` only.
    Cancelled,
}

use super::identity::UserId;
use super::messages::{DeadLetter, Delivery, Headers};
use super::money::{Amount, Balance};
use super::stop::Stop;
use super::ticket::{BatchId, BatchPayment, NewTicket, RouteId, Ticket, TicketId};
use super::tracking::{TrackingId, TrackingStatus};
use super::wallet::{CreditKind, LedgerEntry, Transaction};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Durable ticket storage. Every state transition is a single conditional
/// update performed under the store's own write lock.
#[async_trait]
pub trait TicketStore: Send + Sync {
    /// Persists all tickets or none of them.
    async fn create_batch(&self, tickets: Vec<NewTicket>) -> Result<Vec<Ticket>>;
    async fn get(&self, id: TicketId) -> Result<Option<Ticket>>;
    async fn get_by_qr(&self, qr_code: &str) -> Result<Option<Ticket>>;
    /// Members of a batch, ordered by ticket id.
    async fn batch(&self, batch_id: &BatchId) -> Result<Vec<Ticket>>;
    async fn batch_by_reference(&self, payment_reference: &str) -> Result<Vec<Ticket>>;
    /// Newest first, plus the total number of tickets the user owns.
    async fn list_by_user(
        &self,
        user_id: UserId,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<Ticket>, usize)>;
    /// Flips `checked` to true. Returns `None` when the ticket was already
    /// checked or has been cancelled.
    async fn mark_checked(&self, id: TicketId) -> Result<Option<Ticket>>;
    /// Sets `cancelled_at`. Returns `None` when the ticket was already
    /// checked or already cancelled.
    async fn cancel(&self, id: TicketId, at: DateTime<Utc>) -> Result<Option<Ticket>>;
    /// Clears `cancelled_at`; compensation for a cancellation whose refund failed.
    async fn reinstate(&self, id: TicketId) -> Result<()>;
    /// Applies a payment outcome to every member of the batch. `Confirmed`
    /// only applies while no member has `payment_used`, and no outcome
    /// downgrades a confirmed batch. Returns the number of tickets updated.
    async fn apply_batch_payment(&self, batch_id: &BatchId, outcome: BatchPayment)
    -> Result<usize>;
}

/// Wallet balances plus their append-only transaction log.
///
/// `LedgerEntry::reference` is an idempotency key: repeating a mutation with
/// a reference already in the log returns the original transaction and
/// leaves the balance untouched. Reusing a reference for a different user,
/// type or amount fails with `Conflict`.
#[async_trait]
pub trait WalletLedger: Send + Sync {
    /// Atomic conditional decrement; `InsufficientFunds` if the balance
    /// does not cover `amount`. Logs a `purchase` transaction.
    async fn debit(&self, user_id: UserId, amount: Amount, entry: LedgerEntry)
    -> Result<Transaction>;
    async fn credit(
        &self,
        user_id: UserId,
        amount: Amount,
        kind: CreditKind,
        entry: LedgerEntry,
    ) -> Result<Transaction>;
    async fn balance(&self, user_id: UserId) -> Result<Balance>;
    /// Newest first.
    async fn transactions(&self, user_id: UserId) -> Result<Vec<Transaction>>;
    async fn find_by_reference(&self, reference: &str) -> Result<Option<Transaction>>;
}

/// Short-lived tracking id to status mapping. Single writer per key.
#[async_trait]
pub trait StatusCache: Send + Sync {
    async fn put(&self, tracking_id: &TrackingId, status: TrackingStatus) -> Result<()>;
    async fn get(&self, tracking_id: &TrackingId) -> Result<Option<TrackingStatus>>;
}

/// At-least-once work queue. A received message stays in flight until it is
/// acked, retried or dead-lettered.
#[async_trait]
pub trait WorkQueue<M>: Send + Sync
where
    M: Send + Sync + 'static,
{
    async fn publish(&self, message: M, headers: Headers) -> Result<()>;
    /// Waits until a message is available.
    async fn receive(&self) -> Result<Delivery<M>>;
    async fn ack(&self, tag: u64) -> Result<()>;
    /// Puts the message back at the end of the queue.
    async fn retry(&self, tag: u64) -> Result<()>;
    async fn dead_letter(&self, tag: u64, error: String) -> Result<()>;
    async fn dead_letters(&self) -> Result<Vec<DeadLetter<M>>>;
}

/// External payment provider.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Opens a payment session and returns the URL to redirect the payer to.
    async fn init_payment(
        &self,
        amount: Amount,
        transaction_id: &str,
        success_url: &str,
        fail_url: &str,
        cancel_url: &str,
    ) -> Result<String>;
    async fn validate_payment(
        &self,
        validation_id: &str,
        transaction_id: &str,
        amount: Amount,
    ) -> Result<bool>;
}

/// Fare for travelling between two stops of a route.
#[async_trait]
pub trait FareCalculator: Send + Sync {
    async fn fare(&self, route_id: RouteId, from: &str, to: &str) -> Result<Amount>;
}

#[async_trait]
pub trait StopDirectory: Send + Sync {
    async fn stop(&self, route_id: RouteId, name: &str) -> Result<Option<Stop>>;
}

pub type TicketStoreRef = Arc<dyn TicketStore>;
pub type WalletLedgerRef = Arc<dyn WalletLedger>;
pub type StatusCacheRef = Arc<dyn StatusCache>;
pub type WorkQueueRef<M> = Arc<dyn WorkQueue<M>>;
pub type PaymentGatewayRef = Arc<dyn PaymentGateway>;
pub type FareCalculatorRef = Arc<dyn FareCalculator>;
pub type StopDirectoryRef = Arc<dyn StopDirectory>;

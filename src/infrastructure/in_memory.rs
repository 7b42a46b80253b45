use crate::domain::identity::UserId;
use crate::domain::messages::{DeadLetter, Delivery, Headers, QueuedMessage};
use crate::domain::money::{Amount, Balance};
use crate::domain::ports::{StatusCache, TicketStore, WalletLedger, WorkQueue};
use crate::domain::ticket::{
    BatchId, BatchPayment, NewTicket, Ticket, TicketId, apply_batch_payment,
};
use crate::domain::tracking::{TrackingId, TrackingStatus};
use crate::domain::wallet::{
    CreditKind, LedgerEntry, Transaction, TransactionType, WalletAccount,
};
use crate::error::{Result, TicketingError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Notify, RwLock};

#[derive(Default)]
struct TicketTable {
    tickets: BTreeMap<TicketId, Ticket>,
    by_qr: HashMap<String, TicketId>,
    next_id: i64,
}

impl TicketTable {
    fn batch_ids(&self, batch_id: &BatchId) -> Vec<TicketId> {
        self.tickets
            .values()
            .filter(|t| &t.batch_id == batch_id)
            .map(|t| t.id)
            .collect()
    }
}

/// A thread-safe in-memory ticket store.
///
/// All conditional transitions run under one `RwLock` write guard, which is
/// what makes them atomic with respect to each other.
#[derive(Default, Clone)]
pub struct InMemoryTicketStore {
    table: Arc<RwLock<TicketTable>>,
}

impl InMemoryTicketStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TicketStore for InMemoryTicketStore {
    async fn create_batch(&self, tickets: Vec<NewTicket>) -> Result<Vec<Ticket>> {
        let mut table = self.table.write().await;

        for (i, ticket) in tickets.iter().enumerate() {
            let clashes_in_request = tickets[..i].iter().any(|t| t.qr_code == ticket.qr_code);
            if clashes_in_request || table.by_qr.contains_key(&ticket.qr_code) {
                return Err(TicketingError::Persistence(format!(
                    "duplicate QR code {}",
                    ticket.qr_code
                )));
            }
        }

        let mut created = Vec::with_capacity(tickets.len());
        for new_ticket in tickets {
            table.next_id += 1;
            let ticket = new_ticket.into_ticket(TicketId(table.next_id));
            table.by_qr.insert(ticket.qr_code.clone(), ticket.id);
            table.tickets.insert(ticket.id, ticket.clone());
            created.push(ticket);
        }
        Ok(created)
    }

    async fn get(&self, id: TicketId) -> Result<Option<Ticket>> {
        let table = self.table.read().await;
        Ok(table.tickets.get(&id).cloned())
    }

    async fn get_by_qr(&self, qr_code: &str) -> Result<Option<Ticket>> {
        let table = self.table.read().await;
        Ok(table
            .by_qr
            .get(qr_code)
            .and_then(|id| table.tickets.get(id))
            .cloned())
    }

    async fn batch(&self, batch_id: &BatchId) -> Result<Vec<Ticket>> {
        let table = self.table.read().await;
        Ok(table
            .tickets
            .values()
            .filter(|t| &t.batch_id == batch_id)
            .cloned()
            .collect())
    }

    async fn batch_by_reference(&self, payment_reference: &str) -> Result<Vec<Ticket>> {
        let table = self.table.read().await;
        Ok(table
            .tickets
            .values()
            .filter(|t| t.payment_reference == payment_reference)
            .cloned()
            .collect())
    }

    async fn list_by_user(
        &self,
        user_id: UserId,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<Ticket>, usize)> {
        let table = self.table.read().await;
        let owned: Vec<&Ticket> = table
            .tickets
            .values()
            .rev()
            .filter(|t| t.user_id == user_id)
            .collect();
        let total = owned.len();
        let page = owned.into_iter().skip(offset).take(limit).cloned().collect();
        Ok((page, total))
    }

    async fn mark_checked(&self, id: TicketId) -> Result<Option<Ticket>> {
        let mut table = self.table.write().await;
        let ticket = table
            .tickets
            .get_mut(&id)
            .ok_or_else(|| TicketingError::NotFound(format!("ticket {id}")))?;
        Ok(ticket.try_check().then(|| ticket.clone()))
    }

    async fn cancel(&self, id: TicketId, at: DateTime<Utc>) -> Result<Option<Ticket>> {
        let mut table = self.table.write().await;
        let ticket = table
            .tickets
            .get_mut(&id)
            .ok_or_else(|| TicketingError::NotFound(format!("ticket {id}")))?;
        Ok(ticket.try_cancel(at).then(|| ticket.clone()))
    }

    async fn reinstate(&self, id: TicketId) -> Result<()> {
        let mut table = self.table.write().await;
        if let Some(ticket) = table.tickets.get_mut(&id) {
            ticket.cancelled_at = None;
        }
        Ok(())
    }

    async fn apply_batch_payment(
        &self,
        batch_id: &BatchId,
        outcome: BatchPayment,
    ) -> Result<usize> {
        let mut table = self.table.write().await;
        let ids = table.batch_ids(batch_id);
        let mut batch: Vec<Ticket> = ids
            .iter()
            .filter_map(|id| table.tickets.get(id).cloned())
            .collect();

        let updated = apply_batch_payment(&mut batch, outcome);
        if updated > 0 {
            for ticket in batch {
                table.tickets.insert(ticket.id, ticket);
            }
        }
        Ok(updated)
    }
}

#[derive(Default)]
struct LedgerBook {
    wallets: HashMap<UserId, WalletAccount>,
    transactions: Vec<Transaction>,
    by_reference: HashMap<String, usize>,
}

impl LedgerBook {
    fn existing(&self, reference: &str) -> Option<Transaction> {
        self.by_reference
            .get(reference)
            .map(|&index| self.transactions[index].clone())
    }

    fn append(
        &mut self,
        user_id: UserId,
        amount: Amount,
        r#type: TransactionType,
        entry: LedgerEntry,
    ) -> Transaction {
        let id = self.transactions.len() as i64 + 1;
        let tx = entry.into_transaction(id, user_id, amount, r#type);
        self.by_reference
            .insert(tx.reference.clone(), self.transactions.len());
        self.transactions.push(tx.clone());
        tx
    }
}

/// In-memory wallet ledger.
///
/// A single mutex guards balances and the log together, so the balance check
/// and the decrement can never interleave with another debit.
#[derive(Default, Clone)]
pub struct InMemoryWalletLedger {
    book: Arc<Mutex<LedgerBook>>,
}

impl InMemoryWalletLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WalletLedger for InMemoryWalletLedger {
    async fn debit(
        &self,
        user_id: UserId,
        amount: Amount,
        entry: LedgerEntry,
    ) -> Result<Transaction> {
        let mut book = self.book.lock().await;
        if let Some(tx) = book.existing(&entry.reference) {
            return tx.replay(user_id, amount, TransactionType::Purchase);
        }
        book.wallets
            .entry(user_id)
            .or_insert_with(|| WalletAccount::new(user_id))
            .debit(amount)?;
        Ok(book.append(user_id, amount, TransactionType::Purchase, entry))
    }

    async fn credit(
        &self,
        user_id: UserId,
        amount: Amount,
        kind: CreditKind,
        entry: LedgerEntry,
    ) -> Result<Transaction> {
        let mut book = self.book.lock().await;
        if let Some(tx) = book.existing(&entry.reference) {
            return tx.replay(user_id, amount, kind.into());
        }
        book.wallets
            .entry(user_id)
            .or_insert_with(|| WalletAccount::new(user_id))
            .credit(amount);
        Ok(book.append(user_id, amount, kind.into(), entry))
    }

    async fn balance(&self, user_id: UserId) -> Result<Balance> {
        let book = self.book.lock().await;
        Ok(book
            .wallets
            .get(&user_id)
            .map(|w| w.balance)
            .unwrap_or(Balance::ZERO))
    }

    async fn transactions(&self, user_id: UserId) -> Result<Vec<Transaction>> {
        let book = self.book.lock().await;
        Ok(book
            .transactions
            .iter()
            .rev()
            .filter(|tx| tx.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn find_by_reference(&self, reference: &str) -> Result<Option<Transaction>> {
        let book = self.book.lock().await;
        Ok(book.existing(reference))
    }
}

/// Tracking statuses with a fixed time-to-live, expired lazily on read.
#[derive(Clone)]
pub struct InMemoryStatusCache {
    entries: Arc<RwLock<HashMap<TrackingId, (TrackingStatus, Instant)>>>,
    ttl: Duration,
}

impl InMemoryStatusCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::default(),
            ttl,
        }
    }

    /// Drops every expired entry; returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        let now = Instant::now();
        entries.retain(|_, (_, expires_at)| *expires_at > now);
        before - entries.len()
    }
}

#[async_trait]
impl StatusCache for InMemoryStatusCache {
    async fn put(&self, tracking_id: &TrackingId, status: TrackingStatus) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.insert(tracking_id.clone(), (status, Instant::now() + self.ttl));
        Ok(())
    }

    async fn get(&self, tracking_id: &TrackingId) -> Result<Option<TrackingStatus>> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(tracking_id)
            .filter(|(_, expires_at)| *expires_at > Instant::now())
            .map(|(status, _)| status.clone()))
    }
}

struct QueueState<M> {
    ready: VecDeque<QueuedMessage<M>>,
    in_flight: HashMap<u64, QueuedMessage<M>>,
    dead: Vec<DeadLetter<M>>,
    next_tag: u64,
}

impl<M> Default for QueueState<M> {
    fn default() -> Self {
        Self {
            ready: VecDeque::new(),
            in_flight: HashMap::new(),
            dead: Vec::new(),
            next_tag: 0,
        }
    }
}

/// Process-local work queue with explicit acknowledgement.
pub struct InMemoryWorkQueue<M> {
    state: Mutex<QueueState<M>>,
    available: Notify,
}

impl<M> InMemoryWorkQueue<M> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            available: Notify::new(),
        }
    }

    /// Messages delivered but not yet acked, retried or dead-lettered.
    pub async fn in_flight(&self) -> usize {
        self.state.lock().await.in_flight.len()
    }
}

impl<M> Default for InMemoryWorkQueue<M> {
    fn default() -> Self {
        Self::new()
    }
}

fn unknown_delivery(tag: u64) -> TicketingError {
    TicketingError::Persistence(format!("unknown delivery tag {tag}"))
}

#[async_trait]
impl<M> WorkQueue<M> for InMemoryWorkQueue<M>
where
    M: Clone + Send + Sync + 'static,
{
    async fn publish(&self, message: M, headers: Headers) -> Result<()> {
        self.state
            .lock()
            .await
            .ready
            .push_back(QueuedMessage::new(message, headers));
        self.available.notify_one();
        Ok(())
    }

    async fn receive(&self) -> Result<Delivery<M>> {
        loop {
            let notified = self.available.notified();
            {
                let mut state = self.state.lock().await;
                if let Some(mut queued) = state.ready.pop_front() {
                    queued.attempt += 1;
                    state.next_tag += 1;
                    let tag = state.next_tag;
                    state.in_flight.insert(tag, queued.clone());
                    if !state.ready.is_empty() {
                        self.available.notify_one();
                    }
                    return Ok(queued.into_delivery(tag));
                }
            }
            notified.await;
        }
    }

    async fn ack(&self, tag: u64) -> Result<()> {
        let mut state = self.state.lock().await;
        state
            .in_flight
            .remove(&tag)
            .map(|_| ())
            .ok_or_else(|| unknown_delivery(tag))
    }

    async fn retry(&self, tag: u64) -> Result<()> {
        let mut state = self.state.lock().await;
        let queued = state
            .in_flight
            .remove(&tag)
            .ok_or_else(|| unknown_delivery(tag))?;
        state.ready.push_back(queued);
        self.available.notify_one();
        Ok(())
    }

    async fn dead_letter(&self, tag: u64, error: String) -> Result<()> {
        let mut state = self.state.lock().await;
        let queued = state
            .in_flight
            .remove(&tag)
            .ok_or_else(|| unknown_delivery(tag))?;
        state.dead.push(queued.into_dead_letter(error));
        Ok(())
    }

    async fn dead_letters(&self) -> Result<Vec<DeadLetter<M>>> {
        Ok(self.state.lock().await.dead.clone())
    }
}

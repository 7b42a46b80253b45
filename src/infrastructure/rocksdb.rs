use crate::domain::identity::UserId;
use crate::domain::messages::{
    DeadLetter, Delivery, Headers, QueuedMessage, TICKET_CHECK_QUEUE, TICKET_QUEUE,
};
use crate::domain::money::{Amount, Balance};
use crate::domain::ports::{TicketStore, WalletLedger, WorkQueue};
use crate::domain::ticket::{
    BatchId, BatchPayment, NewTicket, Ticket, TicketId, apply_batch_payment,
};
use crate::domain::wallet::{
    CreditKind, LedgerEntry, Transaction, TransactionType, WalletAccount,
};
use crate::error::{Result, TicketingError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options, WriteBatch,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};

/// Column Family for ticket rows, keyed by ticket id.
pub const CF_TICKETS: &str = "tickets";
/// QR code to ticket id.
pub const CF_TICKET_QR: &str = "ticket_qr";
/// Secondary ticket indexes: by batch, by payment reference, by owner.
pub const CF_TICKET_INDEX: &str = "ticket_index";
pub const CF_WALLETS: &str = "wallets";
/// Append-only wallet transaction log, keyed by transaction id.
pub const CF_LEDGER: &str = "ledger";
/// Ledger indexes: by reference, by owner.
pub const CF_LEDGER_INDEX: &str = "ledger_index";
/// Id sequences.
pub const CF_META: &str = "meta";

const QUEUES: [&str; 2] = [TICKET_QUEUE, TICKET_CHECK_QUEUE];

const TICKET_SEQ: &[u8] = b"ticket_seq";
const TX_SEQ: &[u8] = b"tx_seq";

fn ready_cf(queue: &str) -> String {
    format!("{queue}.ready")
}

fn in_flight_cf(queue: &str) -> String {
    format!("{queue}.in_flight")
}

fn dead_cf(queue: &str) -> String {
    format!("{queue}.dead")
}

fn column_families() -> Vec<String> {
    let mut names: Vec<String> = [
        CF_TICKETS,
        CF_TICKET_QR,
        CF_TICKET_INDEX,
        CF_WALLETS,
        CF_LEDGER,
        CF_LEDGER_INDEX,
        CF_META,
    ]
    .iter()
    .map(|name| name.to_string())
    .collect();
    for queue in QUEUES {
        names.extend([ready_cf(queue), in_flight_cf(queue), dead_cf(queue)]);
    }
    names
}

fn handle<'a>(db: &'a DB, name: &str) -> Result<&'a ColumnFamily> {
    db.cf_handle(name)
        .ok_or_else(|| TicketingError::internal(format!("column family {name} not found")))
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(bytes)?)
}

fn be_i64(bytes: &[u8]) -> Result<i64> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| TicketingError::internal("malformed 8-byte key"))?;
    Ok(i64::from_be_bytes(raw))
}

fn be_u64(bytes: &[u8]) -> Result<u64> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| TicketingError::internal("malformed 8-byte key"))?;
    Ok(u64::from_be_bytes(raw))
}

/// `<tag><text>\0`, the prefix of a string-keyed index entry.
fn text_prefix(tag: &str, text: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(tag.len() + text.len() + 9);
    key.extend_from_slice(tag.as_bytes());
    key.extend_from_slice(text.as_bytes());
    key.push(0);
    key
}

fn user_prefix(user_id: UserId) -> Vec<u8> {
    let mut key = b"user:".to_vec();
    key.extend_from_slice(&user_id.0.to_be_bytes());
    key
}

fn with_id(mut prefix: Vec<u8>, id: i64) -> Vec<u8> {
    prefix.extend_from_slice(&id.to_be_bytes());
    prefix
}

/// Ids stored in the trailing 8 bytes of every key under `prefix`, in key order.
fn ids_under(db: &DB, cf: &ColumnFamily, prefix: &[u8]) -> Result<Vec<i64>> {
    let mut ids = Vec::new();
    for item in db.iterator_cf(cf, IteratorMode::From(prefix, Direction::Forward)) {
        let (key, _) = item?;
        if !key.starts_with(prefix) {
            break;
        }
        ids.push(be_i64(&key[prefix.len()..])?);
    }
    Ok(ids)
}

/// A persistent store implementation using RocksDB.
///
/// Tickets, wallets and the ledger live in separate Column Families; every
/// mutation is one `WriteBatch`, so a row and its indexes are written
/// atomically. Read-modify-write sequences are serialized by one async
/// mutex, which is what makes `mark_checked`, `cancel`, `debit` and
/// `apply_batch_payment` conditional updates.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path, creating
    /// any missing column families.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect::<Vec<_>>();
        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::default(),
        })
    }

    /// Durable queue `name`, sharing this store's database. Messages left
    /// in flight by a previous process are moved back to ready.
    pub fn work_queue<M>(&self, name: &str) -> Result<RocksDBWorkQueue<M>>
    where
        M: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        RocksDBWorkQueue::open(self.db.clone(), name)
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        handle(&self.db, name)
    }

    fn sequence(&self, key: &[u8]) -> Result<i64> {
        match self.db.get_cf(self.cf(CF_META)?, key)? {
            Some(bytes) => be_i64(&bytes),
            None => Ok(0),
        }
    }

    fn load_ticket(&self, id: TicketId) -> Result<Option<Ticket>> {
        self.db
            .get_cf(self.cf(CF_TICKETS)?, id.0.to_be_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    fn load_indexed(&self, prefix: &[u8]) -> Result<Vec<Ticket>> {
        let ids = ids_under(&self.db, self.cf(CF_TICKET_INDEX)?, prefix)?;
        let mut tickets = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(ticket) = self.load_ticket(TicketId(id))? {
                tickets.push(ticket);
            }
        }
        Ok(tickets)
    }

    fn put_ticket(&self, batch: &mut WriteBatch, ticket: &Ticket) -> Result<()> {
        batch.put_cf(self.cf(CF_TICKETS)?, ticket.id.0.to_be_bytes(), encode(ticket)?);
        Ok(())
    }

    /// Loads a ticket, lets `transition` decide whether to change it, and
    /// persists the result. `None` when the transition was refused.
    async fn transition<F>(&self, id: TicketId, transition: F) -> Result<Option<Ticket>>
    where
        F: FnOnce(&mut Ticket) -> bool,
    {
        let _guard = self.write_lock.lock().await;
        let mut ticket = self
            .load_ticket(id)?
            .ok_or_else(|| TicketingError::NotFound(format!("ticket {id}")))?;
        if !transition(&mut ticket) {
            return Ok(None);
        }
        let mut batch = WriteBatch::default();
        self.put_ticket(&mut batch, &ticket)?;
        self.db.write(batch)?;
        Ok(Some(ticket))
    }

    fn load_wallet(&self, user_id: UserId) -> Result<WalletAccount> {
        Ok(self
            .db
            .get_cf(self.cf(CF_WALLETS)?, user_id.0.to_be_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()?
            .unwrap_or_else(|| WalletAccount::new(user_id)))
    }

    fn load_transaction(&self, id: i64) -> Result<Option<Transaction>> {
        self.db
            .get_cf(self.cf(CF_LEDGER)?, id.to_be_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    fn existing(&self, reference: &str) -> Result<Option<Transaction>> {
        let key = text_prefix("ref:", reference);
        match self.db.get_cf(self.cf(CF_LEDGER_INDEX)?, key)? {
            Some(id) => self.load_transaction(be_i64(&id)?),
            None => Ok(None),
        }
    }

    /// Writes the updated wallet and its transaction in one batch.
    fn record(
        &self,
        wallet: &WalletAccount,
        amount: Amount,
        r#type: TransactionType,
        entry: LedgerEntry,
    ) -> Result<Transaction> {
        let id = self.sequence(TX_SEQ)? + 1;
        let tx = entry.into_transaction(id, wallet.user_id, amount, r#type);
        let index = self.cf(CF_LEDGER_INDEX)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(self.cf(CF_WALLETS)?, wallet.user_id.0.to_be_bytes(), encode(wallet)?);
        batch.put_cf(self.cf(CF_LEDGER)?, id.to_be_bytes(), encode(&tx)?);
        batch.put_cf(index, text_prefix("ref:", &tx.reference), id.to_be_bytes());
        batch.put_cf(index, with_id(user_prefix(wallet.user_id), id), b"");
        batch.put_cf(self.cf(CF_META)?, TX_SEQ, id.to_be_bytes());
        self.db.write(batch)?;
        Ok(tx)
    }
}

#[async_trait]
impl TicketStore for RocksDBStore {
    async fn create_batch(&self, tickets: Vec<NewTicket>) -> Result<Vec<Ticket>> {
        let _guard = self.write_lock.lock().await;
        let qr = self.cf(CF_TICKET_QR)?;
        let index = self.cf(CF_TICKET_INDEX)?;

        for (i, ticket) in tickets.iter().enumerate() {
            let clashes_in_request = tickets[..i].iter().any(|t| t.qr_code == ticket.qr_code);
            if clashes_in_request || self.db.get_pinned_cf(qr, &ticket.qr_code)?.is_some() {
                return Err(TicketingError::Persistence(format!(
                    "duplicate QR code {}",
                    ticket.qr_code
                )));
            }
        }

        let mut next_id = self.sequence(TICKET_SEQ)?;
        let mut batch = WriteBatch::default();
        let mut created = Vec::with_capacity(tickets.len());
        for new_ticket in tickets {
            next_id += 1;
            let ticket = new_ticket.into_ticket(TicketId(next_id));
            self.put_ticket(&mut batch, &ticket)?;
            batch.put_cf(qr, ticket.qr_code.as_bytes(), next_id.to_be_bytes());
            batch.put_cf(
                index,
                with_id(text_prefix("batch:", &ticket.batch_id.0), next_id),
                b"",
            );
            batch.put_cf(
                index,
                with_id(text_prefix("ref:", &ticket.payment_reference), next_id),
                b"",
            );
            batch.put_cf(index, with_id(user_prefix(ticket.user_id), next_id), b"");
            created.push(ticket);
        }
        batch.put_cf(self.cf(CF_META)?, TICKET_SEQ, next_id.to_be_bytes());
        self.db.write(batch)?;
        Ok(created)
    }

    async fn get(&self, id: TicketId) -> Result<Option<Ticket>> {
        self.load_ticket(id)
    }

    async fn get_by_qr(&self, qr_code: &str) -> Result<Option<Ticket>> {
        match self.db.get_cf(self.cf(CF_TICKET_QR)?, qr_code)? {
            Some(id) => self.load_ticket(TicketId(be_i64(&id)?)),
            None => Ok(None),
        }
    }

    async fn batch(&self, batch_id: &BatchId) -> Result<Vec<Ticket>> {
        self.load_indexed(&text_prefix("batch:", &batch_id.0))
    }

    async fn batch_by_reference(&self, payment_reference: &str) -> Result<Vec<Ticket>> {
        self.load_indexed(&text_prefix("ref:", payment_reference))
    }

    async fn list_by_user(
        &self,
        user_id: UserId,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<Ticket>, usize)> {
        let ids = ids_under(&self.db, self.cf(CF_TICKET_INDEX)?, &user_prefix(user_id))?;
        let total = ids.len();
        let mut page = Vec::new();
        for id in ids.into_iter().rev().skip(offset).take(limit) {
            if let Some(ticket) = self.load_ticket(TicketId(id))? {
                page.push(ticket);
            }
        }
        Ok((page, total))
    }

    async fn mark_checked(&self, id: TicketId) -> Result<Option<Ticket>> {
        self.transition(id, Ticket::try_check).await
    }

    async fn cancel(&self, id: TicketId, at: DateTime<Utc>) -> Result<Option<Ticket>> {
        self.transition(id, |ticket| ticket.try_cancel(at)).await
    }

    async fn reinstate(&self, id: TicketId) -> Result<()> {
        self.transition(id, |ticket| ticket.cancelled_at.take().is_some())
            .await
            .map(|_| ())
    }

    async fn apply_batch_payment(
        &self,
        batch_id: &BatchId,
        outcome: BatchPayment,
    ) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let mut members = self.load_indexed(&text_prefix("batch:", &batch_id.0))?;
        let updated = apply_batch_payment(&mut members, outcome);
        if updated > 0 {
            let mut batch = WriteBatch::default();
            for ticket in &members {
                self.put_ticket(&mut batch, ticket)?;
            }
            self.db.write(batch)?;
        }
        Ok(updated)
    }
}

#[async_trait]
impl WalletLedger for RocksDBStore {
    async fn debit(
        &self,
        user_id: UserId,
        amount: Amount,
        entry: LedgerEntry,
    ) -> Result<Transaction> {
        let _guard = self.write_lock.lock().await;
        if let Some(tx) = self.existing(&entry.reference)? {
            return tx.replay(user_id, amount, TransactionType::Purchase);
        }
        let mut wallet = self.load_wallet(user_id)?;
        wallet.debit(amount)?;
        self.record(&wallet, amount, TransactionType::Purchase, entry)
    }

    async fn credit(
        &self,
        user_id: UserId,
        amount: Amount,
        kind: CreditKind,
        entry: LedgerEntry,
    ) -> Result<Transaction> {
        let _guard = self.write_lock.lock().await;
        if let Some(tx) = self.existing(&entry.reference)? {
            return tx.replay(user_id, amount, kind.into());
        }
        let mut wallet = self.load_wallet(user_id)?;
        wallet.credit(amount);
        self.record(&wallet, amount, kind.into(), entry)
    }

    async fn balance(&self, user_id: UserId) -> Result<Balance> {
        Ok(self.load_wallet(user_id)?.balance)
    }

    async fn transactions(&self, user_id: UserId) -> Result<Vec<Transaction>> {
        let ids = ids_under(&self.db, self.cf(CF_LEDGER_INDEX)?, &user_prefix(user_id))?;
        let mut log = Vec::with_capacity(ids.len());
        for id in ids.into_iter().rev() {
            if let Some(tx) = self.load_transaction(id)? {
                log.push(tx);
            }
        }
        Ok(log)
    }

    async fn find_by_reference(&self, reference: &str) -> Result<Option<Transaction>> {
        self.existing(reference)
    }
}

/// Durable work queue stored in three column families per queue: ready
/// messages keyed by sequence number, in-flight messages keyed by delivery
/// tag, and dead letters.
pub struct RocksDBWorkQueue<M> {
    db: Arc<DB>,
    name: String,
    ready: String,
    in_flight: String,
    dead: String,
    next_seq: Mutex<u64>,
    available: Notify,
    _message: PhantomData<fn() -> M>,
}

impl<M> RocksDBWorkQueue<M>
where
    M: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn open(db: Arc<DB>, name: &str) -> Result<Self> {
        let (ready, in_flight, dead) = (ready_cf(name), in_flight_cf(name), dead_cf(name));

        let mut next_seq = 0;
        for cf_name in [&ready, &in_flight, &dead] {
            let cf = handle(&db, cf_name)?;
            if let Some(item) = db.iterator_cf(cf, IteratorMode::End).next() {
                let (key, _) = item?;
                next_seq = next_seq.max(be_u64(&key)?);
            }
        }
        next_seq += 1;

        // Anything in flight belonged to a consumer that no longer exists.
        let mut recovered = 0;
        {
            let in_flight_cf = handle(&db, &in_flight)?;
            let ready_cf = handle(&db, &ready)?;
            let mut batch = WriteBatch::default();
            for item in db.iterator_cf(in_flight_cf, IteratorMode::Start) {
                let (key, value) = item?;
                batch.delete_cf(in_flight_cf, &key);
                batch.put_cf(ready_cf, next_seq.to_be_bytes(), &value);
                next_seq += 1;
                recovered += 1;
            }
            db.write(batch)?;
        }
        if recovered > 0 {
            tracing::warn!(queue = name, recovered, "Requeued messages left in flight");
        }

        Ok(Self {
            db,
            name: name.to_string(),
            ready,
            in_flight,
            dead,
            next_seq: Mutex::new(next_seq),
            available: Notify::new(),
            _message: PhantomData,
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        handle(&self.db, name)
    }

    fn take_next(&self) -> Result<Option<Delivery<M>>> {
        let ready = self.cf(&self.ready)?;
        let Some(item) = self.db.iterator_cf(ready, IteratorMode::Start).next() else {
            return Ok(None);
        };
        let (key, value) = item?;
        let tag = be_u64(&key)?;
        let mut queued: QueuedMessage<M> = decode(&value)?;
        queued.attempt += 1;

        let mut batch = WriteBatch::default();
        batch.delete_cf(ready, &key);
        batch.put_cf(self.cf(&self.in_flight)?, &key, encode(&queued)?);
        self.db.write(batch)?;
        Ok(Some(queued.into_delivery(tag)))
    }

    fn take_in_flight(&self, tag: u64, batch: &mut WriteBatch) -> Result<QueuedMessage<M>> {
        let in_flight = self.cf(&self.in_flight)?;
        let bytes = self.db.get_cf(in_flight, tag.to_be_bytes())?.ok_or_else(|| {
            TicketingError::Persistence(format!("unknown delivery tag {tag} on {}", self.name))
        })?;
        batch.delete_cf(in_flight, tag.to_be_bytes());
        decode(&bytes)
    }
}

#[async_trait]
impl<M> WorkQueue<M> for RocksDBWorkQueue<M>
where
    M: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn publish(&self, message: M, headers: Headers) -> Result<()> {
        {
            let mut next_seq = self.next_seq.lock().await;
            let value = encode(&QueuedMessage::new(message, headers))?;
            self.db
                .put_cf(self.cf(&self.ready)?, next_seq.to_be_bytes(), value)?;
            *next_seq += 1;
        }
        self.available.notify_one();
        Ok(())
    }

    async fn receive(&self) -> Result<Delivery<M>> {
        loop {
            let notified = self.available.notified();
            {
                let _seq = self.next_seq.lock().await;
                if let Some(delivery) = self.take_next()? {
                    return Ok(delivery);
                }
            }
            notified.await;
        }
    }

    async fn ack(&self, tag: u64) -> Result<()> {
        let _seq = self.next_seq.lock().await;
        let mut batch = WriteBatch::default();
        self.take_in_flight(tag, &mut batch)?;
        self.db.write(batch)?;
        Ok(())
    }

    async fn retry(&self, tag: u64) -> Result<()> {
        {
            let mut next_seq = self.next_seq.lock().await;
            let mut batch = WriteBatch::default();
            let queued = self.take_in_flight(tag, &mut batch)?;
            batch.put_cf(self.cf(&self.ready)?, next_seq.to_be_bytes(), encode(&queued)?);
            self.db.write(batch)?;
            *next_seq += 1;
        }
        self.available.notify_one();
        Ok(())
    }

    async fn dead_letter(&self, tag: u64, error: String) -> Result<()> {
        let _seq = self.next_seq.lock().await;
        let mut batch = WriteBatch::default();
        let queued = self.take_in_flight(tag, &mut batch)?;
        batch.put_cf(
            self.cf(&self.dead)?,
            tag.to_be_bytes(),
            encode(&queued.into_dead_letter(error))?,
        );
        self.db.write(batch)?;
        Ok(())
    }

    async fn dead_letters(&self) -> Result<Vec<DeadLetter<M>>> {
        let dead = self.cf(&self.dead)?;
        let mut letters = Vec::new();
        for item in self.db.iterator_cf(dead, IteratorMode::Start) {
            let (_, value) = item?;
            letters.push(decode(&value)?);
        }
        Ok(letters)
    }
}

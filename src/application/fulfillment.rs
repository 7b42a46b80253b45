use super::consumer::MessageHandler;
use crate::config::ServiceConfig;
use crate::domain::messages::{Delivery, FulfillmentRequest, TRACKING_ID_HEADER};
use crate::domain::ports::{PaymentGatewayRef, StatusCacheRef, TicketStoreRef, WalletLedgerRef};
use crate::domain::ticket::{
    BatchPayment, NewTicket, PaymentMethod, PaymentStatus, Ticket, TicketId,
};
use crate::domain::tracking::{TrackingId, TrackingStatus};
use crate::domain::wallet::{CreditKind, LedgerEntry, TransactionType};
use crate::error::{Result, TicketingError};
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

const INSUFFICIENT_BALANCE: &str = "Insufficient balance";
const TICKET_CREATION_FAILED: &str = "Failed to create ticket";
const GATEWAY_INIT_FAILED: &str = "Gateway init failed";

/// Turns queued purchases into tickets.
///
/// Built with the same explicit collaborators the rest of the purchase flow
/// uses. Safe under redelivery: an existing batch is never created twice and
/// the wallet debit is keyed by batch id.
pub struct TicketFulfillmentWorker {
    tickets: TicketStoreRef,
    ledger: WalletLedgerRef,
    gateway: PaymentGatewayRef,
    statuses: StatusCacheRef,
    config: ServiceConfig,
}

impl TicketFulfillmentWorker {
    pub fn new(
        tickets: TicketStoreRef,
        ledger: WalletLedgerRef,
        gateway: PaymentGatewayRef,
        statuses: StatusCacheRef,
        config: ServiceConfig,
    ) -> Self {
        Self {
            tickets,
            ledger,
            gateway,
            statuses,
            config,
        }
    }

    /// Fulfils one purchase and records its terminal status under
    /// `tracking_id`. Business failures (no funds, gateway down) are
    /// recorded and return `Ok`; storage failures are returned for retry.
    pub async fn fulfil(
        &self,
        request: &FulfillmentRequest,
        tracking_id: Option<&TrackingId>,
    ) -> Result<TrackingStatus> {
        if request.quantity == 0 || request.quantity > self.config.max_tickets_per_purchase {
            return Err(TicketingError::Validation(format!(
                "quantity must be between 1 and {}",
                self.config.max_tickets_per_purchase
            )));
        }
        let status = match request.payment_method {
            PaymentMethod::Wallet => self.fulfil_from_wallet(request).await?,
            PaymentMethod::Gateway => self.fulfil_via_gateway(request).await?,
        };
        self.record(tracking_id, &status).await?;
        Ok(status)
    }

    async fn fulfil_from_wallet(&self, request: &FulfillmentRequest) -> Result<TrackingStatus> {
        let existing = self.tickets.batch(&request.batch_id).await?;
        if !existing.is_empty() {
            if !fulfilled_from_wallet(&existing, request) {
                tracing::warn!(
                    batch_id = %request.batch_id,
                    user_id = %request.user_id,
                    "Batch id belongs to another purchase"
                );
                return Ok(TrackingStatus::failed(TICKET_CREATION_FAILED));
            }
            tracing::info!(batch_id = %request.batch_id, "Batch already fulfilled");
            return Ok(TrackingStatus::paid(ids(&existing)));
        }

        let entry = LedgerEntry::new(
            request.batch_id.ledger_reference(),
            format!(
                "{} ticket(s) {} to {} on {}",
                request.quantity, request.start_destination, request.end_destination, request.bus_name
            ),
            PaymentMethod::Wallet,
        );
        match self
            .ledger
            .debit(request.user_id, request.total_fare, entry)
            .await
        {
            Ok(tx) => {
                tracing::info!(
                    batch_id = %request.batch_id,
                    user_id = %request.user_id,
                    amount = %tx.amount,
                    "Wallet debited"
                );
            }
            Err(TicketingError::InsufficientFunds) => {
                tracing::warn!(
                    batch_id = %request.batch_id,
                    user_id = %request.user_id,
                    amount = %request.total_fare,
                    "Wallet payment failed: insufficient balance"
                );
                return Ok(TrackingStatus::failed(INSUFFICIENT_BALANCE));
            }
            Err(e) => return Err(e),
        }

        let created = self
            .tickets
            .create_batch(self.build_tickets(request, true))
            .await?;
        tracing::info!(batch_id = %request.batch_id, count = created.len(), "Tickets created");
        Ok(TrackingStatus::paid(ids(&created)))
    }

    async fn fulfil_via_gateway(&self, request: &FulfillmentRequest) -> Result<TrackingStatus> {
        let mut batch = self.tickets.batch(&request.batch_id).await?;
        if batch.is_empty() {
            batch = self
                .tickets
                .create_batch(self.build_tickets(request, false))
                .await?;
            tracing::info!(batch_id = %request.batch_id, count = batch.len(), "Unpaid tickets created");
        } else if batch.iter().any(|t| t.payment_used) {
            return Ok(TrackingStatus::paid(ids(&batch)));
        }

        let first = batch
            .first()
            .map(|t| t.id)
            .ok_or_else(|| TicketingError::internal("batch created without tickets"))?;
        let transaction_id = request.batch_id.payment_reference();
        let callback = |outcome: &str| {
            self.config
                .callback_url(&format!("/ticket/payment/{outcome}?id={first}"))
        };

        match self
            .gateway
            .init_payment(
                request.total_fare,
                &transaction_id,
                &callback("success"),
                &callback("fail"),
                &callback("cancel"),
            )
            .await
        {
            Ok(url) => {
                tracing::info!(
                    batch_id = %request.batch_id,
                    %transaction_id,
                    "Gateway payment initialised"
                );
                Ok(TrackingStatus::ready(url, ids(&batch)))
            }
            Err(e) => {
                tracing::error!(batch_id = %request.batch_id, error = %e, "Gateway init failed");
                self.tickets
                    .apply_batch_payment(&request.batch_id, BatchPayment::Failed)
                    .await?;
                Ok(TrackingStatus::failed(GATEWAY_INIT_FAILED))
            }
        }
    }

    fn build_tickets(&self, request: &FulfillmentRequest, paid: bool) -> Vec<NewTicket> {
        let now = Utc::now();
        let payment_reference = request.batch_id.payment_reference();
        (0..request.quantity)
            .map(|_| NewTicket {
                user_id: request.user_id,
                route_id: request.route_id,
                bus_name: request.bus_name.clone(),
                start_destination: request.start_destination.clone(),
                end_destination: request.end_destination.clone(),
                fare: request.fare,
                paid_status: paid,
                qr_code: Uuid::new_v4().to_string(),
                created_at: now,
                batch_id: request.batch_id.clone(),
                payment_method: request.payment_method,
                payment_reference: payment_reference.clone(),
                payment_used: paid,
                payment_status: if paid {
                    PaymentStatus::Paid
                } else {
                    PaymentStatus::Pending
                },
            })
            .collect()
    }

    async fn record(&self, tracking_id: Option<&TrackingId>, status: &TrackingStatus) -> Result<()> {
        match tracking_id {
            Some(tracking_id) => {
                self.statuses.put(tracking_id, status.clone()).await?;
                tracing::info!(%tracking_id, status = ?status.status, "Tracking status recorded");
            }
            None => tracing::warn!(status = ?status.status, "Purchase has no tracking id"),
        }
        Ok(())
    }

    /// Undoes a wallet debit for a batch that never got its tickets.
    async fn reverse_debit(&self, request: &FulfillmentRequest) -> Result<()> {
        if request.payment_method != PaymentMethod::Wallet
            || !self.tickets.batch(&request.batch_id).await?.is_empty()
        {
            return Ok(());
        }
        let reference = request.batch_id.ledger_reference();
        let Some(debit) = self.ledger.find_by_reference(&reference).await? else {
            return Ok(());
        };
        if debit.r#type != TransactionType::Purchase || debit.user_id != request.user_id {
            tracing::warn!(
                batch_id = %request.batch_id,
                user_id = %request.user_id,
                "Ledger reference is not this purchase's debit; nothing to reverse"
            );
            return Ok(());
        }
        let entry = LedgerEntry::new(
            format!("reversal:{}", request.batch_id),
            format!("Reversal of failed purchase {}", request.batch_id),
            PaymentMethod::Wallet,
        );
        self.ledger
            .credit(debit.user_id, debit.amount, CreditKind::Refund, entry)
            .await?;
        tracing::warn!(batch_id = %request.batch_id, amount = %debit.amount, "Wallet debit reversed");
        Ok(())
    }
}

/// An existing batch answers a redelivery only when it is this purchaser's
/// wallet-paid batch.
fn fulfilled_from_wallet(batch: &[Ticket], request: &FulfillmentRequest) -> bool {
    batch.iter().all(|t| {
        t.user_id == request.user_id
            && t.payment_method == PaymentMethod::Wallet
            && t.payment_used
    })
}

fn ids(tickets: &[Ticket]) -> Vec<TicketId> {
    tickets.iter().map(|t| t.id).collect()
}

fn tracking_id(delivery: &Delivery<FulfillmentRequest>) -> Option<TrackingId> {
    delivery
        .header(TRACKING_ID_HEADER)
        .map(|id| TrackingId(id.to_string()))
}

#[async_trait]
impl MessageHandler<FulfillmentRequest> for TicketFulfillmentWorker {
    async fn handle(&self, delivery: &Delivery<FulfillmentRequest>) -> Result<()> {
        let tracking_id = tracking_id(delivery);
        tracing::info!(
            batch_id = %delivery.message.batch_id,
            tracking_id = tracking_id.as_ref().map(|t| t.0.as_str()),
            attempt = delivery.attempt,
            "Fulfilling purchase"
        );
        self.fulfil(&delivery.message, tracking_id.as_ref())
            .await
            .map(|_| ())
    }

    async fn abandon(&self, delivery: &Delivery<FulfillmentRequest>, error: &TicketingError) {
        if let Err(e) = self.reverse_debit(&delivery.message).await {
            tracing::error!(
                batch_id = %delivery.message.batch_id,
                error = %e,
                "Could not reverse wallet debit; manual intervention required"
            );
        }
        let message = match error {
            TicketingError::Gateway(_) => GATEWAY_INIT_FAILED,
            _ => TICKET_CREATION_FAILED,
        };
        let tracking_id = tracking_id(delivery);
        if let Err(e) = self
            .record(tracking_id.as_ref(), &TrackingStatus::failed(message))
            .await
        {
            tracing::error!(error = %e, "Could not record failed status");
        }
    }
}

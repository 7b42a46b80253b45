use super::cancellation::refund_entry;
use crate::domain::money::Amount;
use crate::domain::ports::{PaymentGatewayRef, TicketStoreRef, WalletLedgerRef};
use crate::domain::ticket::{BatchId, BatchPayment, PaymentStatus, Ticket, TicketId};
use crate::domain::wallet::CreditKind;
use crate::error::{Result, TicketingError};
use rust_decimal::Decimal;
use serde::Serialize;

/// Result of applying a gateway callback to a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "tickets", rename_all = "snake_case")]
pub enum Reconciliation {
    /// The outcome was written to this many tickets.
    Applied(usize),
    /// The batch was already confirmed; nothing changed.
    AlreadySettled,
}

/// Applies gateway callbacks to ticket batches.
pub struct PaymentReconciler {
    tickets: TicketStoreRef,
    gateway: PaymentGatewayRef,
    ledger: WalletLedgerRef,
}

impl PaymentReconciler {
    pub fn new(tickets: TicketStoreRef, gateway: PaymentGatewayRef, ledger: WalletLedgerRef) -> Self {
        Self {
            tickets,
            gateway,
            ledger,
        }
    }

    /// Success callback. Marks every ticket of the batch paid and used, once.
    ///
    /// The amount must match both the gateway session and the batch total;
    /// repeated callbacks for a settled batch return `AlreadySettled`.
    /// Members cancelled before the payment settled are refunded to the
    /// owner's wallet.
    pub async fn confirm(
        &self,
        transaction_id: &str,
        validation_id: &str,
        amount: Amount,
    ) -> Result<Reconciliation> {
        let batch = self.batch(transaction_id).await?;
        if batch.iter().any(|t| t.payment_used) {
            tracing::info!(transaction_id, "Payment already reconciled");
            self.refund_cancelled(&batch[0].batch_id).await?;
            return Ok(Reconciliation::AlreadySettled);
        }

        let total = batch_total(&batch)?;
        if total != amount {
            tracing::warn!(
                transaction_id,
                expected = %total,
                received = %amount,
                "Payment amount does not match batch total"
            );
            return Err(TicketingError::Conflict(format!(
                "amount {amount} does not match batch total {total}"
            )));
        }

        if !self
            .gateway
            .validate_payment(validation_id, transaction_id, amount)
            .await?
        {
            tracing::warn!(transaction_id, validation_id, "Gateway rejected payment validation");
            return Err(TicketingError::Conflict("payment could not be validated".to_string()));
        }

        let outcome = self
            .apply(transaction_id, &batch[0], BatchPayment::Confirmed)
            .await?;
        self.refund_cancelled(&batch[0].batch_id).await?;
        Ok(outcome)
    }

    /// Fail callback. Leaves `paid_status` and `payment_used` untouched.
    pub async fn fail(&self, transaction_id: &str) -> Result<Reconciliation> {
        let batch = self.batch(transaction_id).await?;
        self.apply(transaction_id, &batch[0], BatchPayment::Failed)
            .await
    }

    /// Cancel callback. Leaves `paid_status` and `payment_used` untouched.
    pub async fn cancel(&self, transaction_id: &str) -> Result<Reconciliation> {
        let batch = self.batch(transaction_id).await?;
        self.apply(transaction_id, &batch[0], BatchPayment::Cancelled)
            .await
    }

    /// Gateway transaction id for the batch `ticket_id` belongs to.
    pub async fn transaction_for_ticket(&self, ticket_id: TicketId) -> Result<String> {
        Ok(self.ticket(ticket_id).await?.payment_reference)
    }

    pub async fn payment_status(&self, ticket_id: TicketId) -> Result<PaymentStatus> {
        Ok(self.ticket(ticket_id).await?.payment_status)
    }

    async fn ticket(&self, ticket_id: TicketId) -> Result<Ticket> {
        self.tickets
            .get(ticket_id)
            .await?
            .ok_or_else(|| TicketingError::NotFound(format!("ticket {ticket_id}")))
    }

    async fn batch(&self, transaction_id: &str) -> Result<Vec<Ticket>> {
        let batch = self.tickets.batch_by_reference(transaction_id).await?;
        if batch.is_empty() {
            return Err(TicketingError::NotFound(format!(
                "payment {transaction_id}"
            )));
        }
        Ok(batch)
    }

    /// Credits paid members that were cancelled. Safe to repeat: each refund
    /// shares its reference with the cancellation path.
    async fn refund_cancelled(&self, batch_id: &BatchId) -> Result<()> {
        for ticket in self.tickets.batch(batch_id).await? {
            if !(ticket.paid_status && ticket.is_cancelled()) {
                continue;
            }
            let tx = self
                .ledger
                .credit(ticket.user_id, ticket.fare, CreditKind::Refund, refund_entry(ticket.id))
                .await?;
            tracing::info!(
                ticket_id = %ticket.id,
                %batch_id,
                refund = %tx.amount,
                "Cancelled ticket refunded after late payment"
            );
        }
        Ok(())
    }

    async fn apply(
        &self,
        transaction_id: &str,
        member: &Ticket,
        outcome: BatchPayment,
    ) -> Result<Reconciliation> {
        let updated = self
            .tickets
            .apply_batch_payment(&member.batch_id, outcome)
            .await?;
        if updated == 0 {
            tracing::info!(transaction_id, ?outcome, "Batch already settled, callback ignored");
            return Ok(Reconciliation::AlreadySettled);
        }
        tracing::info!(
            transaction_id,
            batch_id = %member.batch_id,
            ?outcome,
            tickets = updated,
            "Payment outcome applied"
        );
        Ok(Reconciliation::Applied(updated))
    }
}

fn batch_total(batch: &[Ticket]) -> Result<Amount> {
    let total: Decimal = batch.iter().map(|t| t.fare.value()).sum();
    Amount::new(total)
        .map_err(|_| TicketingError::internal(format!("batch with non-positive total {total}")))
}

use crate::domain::identity::Passenger;
use crate::domain::ports::{TicketStoreRef, WalletLedgerRef};
use crate::domain::ticket::{PaymentMethod, Ticket, TicketId};
use crate::domain::wallet::{CreditKind, LedgerEntry};
use crate::error::{Result, TicketingError};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cancellation {
    pub message: String,
    pub refund: Decimal,
}

/// Cancels unused tickets and refunds them to the owner's wallet.
///
/// Runs as a two-step saga: the ticket is cancelled with a conditional
/// update first, then the refund is credited. If the credit fails the
/// ticket is reinstated.
pub struct CancellationService {
    tickets: TicketStoreRef,
    ledger: WalletLedgerRef,
}

impl CancellationService {
    pub fn new(tickets: TicketStoreRef, ledger: WalletLedgerRef) -> Self {
        Self { tickets, ledger }
    }

    pub async fn cancel(&self, passenger: Passenger, ticket_id: TicketId) -> Result<Cancellation> {
        let ticket = self.ticket(ticket_id).await?;
        if ticket.user_id != passenger.user_id {
            return Err(TicketingError::Forbidden(format!(
                "ticket {ticket_id} belongs to another user"
            )));
        }
        ensure_cancellable(&ticket)?;

        let cancelled = match self.tickets.cancel(ticket_id, Utc::now()).await? {
            Some(cancelled) => cancelled,
            None => {
                ensure_cancellable(&self.ticket(ticket_id).await?)?;
                return Err(TicketingError::Conflict(
                    "ticket can no longer be cancelled".to_string(),
                ));
            }
        };

        // Only a confirmed payment is refunded here. A gateway payment that
        // settles later refunds cancelled members itself.
        if !cancelled.paid_status {
            tracing::info!(%ticket_id, user_id = %passenger.user_id, "Unpaid ticket cancelled");
            return Ok(Cancellation {
                message: "Ticket cancelled".to_string(),
                refund: Decimal::ZERO,
            });
        }

        match self
            .ledger
            .credit(
                passenger.user_id,
                cancelled.fare,
                CreditKind::Refund,
                refund_entry(ticket_id),
            )
            .await
        {
            Ok(tx) => {
                tracing::info!(
                    %ticket_id,
                    user_id = %passenger.user_id,
                    refund = %tx.amount,
                    "Ticket cancelled and refunded"
                );
                Ok(Cancellation {
                    message: "Ticket cancelled and refunded".to_string(),
                    refund: tx.amount.value(),
                })
            }
            Err(e) => {
                tracing::error!(%ticket_id, error = %e, "Refund failed, reinstating ticket");
                if let Err(reinstate) = self.tickets.reinstate(ticket_id).await {
                    tracing::error!(
                        %ticket_id,
                        error = %reinstate,
                        "Could not reinstate ticket after failed refund; manual intervention required"
                    );
                }
                Err(e)
            }
        }
    }

    async fn ticket(&self, id: TicketId) -> Result<Ticket> {
        self.tickets
            .get(id)
            .await?
            .ok_or_else(|| TicketingError::NotFound(format!("ticket {id}")))
    }
}

/// The one ledger entry a cancelled ticket is ever refunded under.
pub(crate) fn refund_entry(ticket_id: TicketId) -> LedgerEntry {
    LedgerEntry::new(
        format!("refund:{ticket_id}"),
        format!("Refund for cancelled ticket {ticket_id}"),
        PaymentMethod::Wallet,
    )
}

fn ensure_cancellable(ticket: &Ticket) -> Result<()> {
    if ticket.checked {
        return Err(TicketingError::Conflict("already checked".to_string()));
    }
    if ticket.is_cancelled() {
        return Err(TicketingError::Conflict("already cancelled".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::identity::UserId;
    use crate::domain::money::{Amount, Balance};
    use crate::domain::ports::{TicketStore, WalletLedger};
    use crate::domain::ticket::{BatchId, NewTicket, PaymentStatus, RouteId};
    use crate::domain::wallet::{Transaction, TransactionType};
    use crate::infrastructure::in_memory::{InMemoryTicketStore, InMemoryWalletLedger};
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    async fn paid_ticket(tickets: &InMemoryTicketStore, paid: bool) -> Ticket {
        tickets
            .create_batch(vec![NewTicket {
                user_id: UserId(1),
                route_id: RouteId(1),
                bus_name: "Green Line".to_string(),
                start_destination: "A".to_string(),
                end_destination: "B".to_string(),
                fare: Amount::new(dec!(40)).unwrap(),
                paid_status: paid,
                qr_code: uuid::Uuid::new_v4().to_string(),
                created_at: Utc::now(),
                batch_id: BatchId::generate(),
                payment_method: PaymentMethod::Wallet,
                payment_reference: "TICKET-x".to_string(),
                payment_used: paid,
                payment_status: PaymentStatus::Paid,
            }])
            .await
            .unwrap()
            .remove(0)
    }

    const OWNER: Passenger = Passenger { user_id: UserId(1) };

    #[tokio::test]
    async fn test_cancel_refunds_full_fare_once() {
        let tickets = InMemoryTicketStore::new();
        let ledger = InMemoryWalletLedger::new();
        let service = CancellationService::new(Arc::new(tickets.clone()), Arc::new(ledger.clone()));
        let ticket = paid_ticket(&tickets, true).await;

        let result = service.cancel(OWNER, ticket.id).await.unwrap();
        assert_eq!(result.refund, dec!(40));
        assert_eq!(ledger.balance(UserId(1)).await.unwrap(), Balance::new(dec!(40)));

        let again = service.cancel(OWNER, ticket.id).await;
        assert!(matches!(again, Err(TicketingError::Conflict(ref m)) if m == "already cancelled"));

        let log = ledger.transactions(UserId(1)).await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].r#type, TransactionType::Refund);
    }

    #[tokio::test]
    async fn test_cancel_rejects_checked_and_foreign_tickets() {
        let tickets = InMemoryTicketStore::new();
        let service = CancellationService::new(
            Arc::new(tickets.clone()),
            Arc::new(InMemoryWalletLedger::new()),
        );
        let ticket = paid_ticket(&tickets, true).await;

        let stranger = Passenger { user_id: UserId(2) };
        assert!(matches!(
            service.cancel(stranger, ticket.id).await,
            Err(TicketingError::Forbidden(_))
        ));

        tickets.mark_checked(ticket.id).await.unwrap();
        assert!(matches!(
            service.cancel(OWNER, ticket.id).await,
            Err(TicketingError::Conflict(ref m)) if m == "already checked"
        ));
    }

    #[tokio::test]
    async fn test_unpaid_ticket_cancels_without_refund() {
        let tickets = InMemoryTicketStore::new();
        let ledger = InMemoryWalletLedger::new();
        let service = CancellationService::new(Arc::new(tickets.clone()), Arc::new(ledger.clone()));
        let ticket = paid_ticket(&tickets, false).await;

        let result = service.cancel(OWNER, ticket.id).await.unwrap();
        assert_eq!(result.refund, Decimal::ZERO);
        assert!(ledger.transactions(UserId(1)).await.unwrap().is_empty());
        assert!(tickets.get(ticket.id).await.unwrap().unwrap().is_cancelled());
    }

    struct BrokenLedger;

    #[async_trait]
    impl WalletLedger for BrokenLedger {
        async fn debit(&self, _: UserId, _: Amount, _: LedgerEntry) -> Result<Transaction> {
            Err(TicketingError::Persistence("ledger offline".into()))
        }
        async fn credit(
            &self,
            _: UserId,
            _: Amount,
            _: CreditKind,
            _: LedgerEntry,
        ) -> Result<Transaction> {
            Err(TicketingError::Persistence("ledger offline".into()))
        }
        async fn balance(&self, _: UserId) -> Result<Balance> {
            Ok(Balance::ZERO)
        }
        async fn transactions(&self, _: UserId) -> Result<Vec<Transaction>> {
            Ok(Vec::new())
        }
        async fn find_by_reference(&self, _: &str) -> Result<Option<Transaction>> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_failed_refund_reinstates_ticket() {
        let tickets = InMemoryTicketStore::new();
        let service = CancellationService::new(Arc::new(tickets.clone()), Arc::new(BrokenLedger));
        let ticket = paid_ticket(&tickets, true).await;

        assert!(matches!(
            service.cancel(OWNER, ticket.id).await,
            Err(TicketingError::Persistence(_))
        ));
        assert!(!tickets.get(ticket.id).await.unwrap().unwrap().is_cancelled());
    }
}

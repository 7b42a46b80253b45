use crate::domain::identity::Passenger;
use crate::domain::ports::TicketStoreRef;
use crate::domain::ticket::{Ticket, TicketId};
use crate::error::{Result, TicketingError};
use serde::Serialize;

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TicketPage {
    pub tickets: Vec<Ticket>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

/// Read access to a passenger's own tickets.
pub struct TicketQueries {
    tickets: TicketStoreRef,
}

impl TicketQueries {
    pub fn new(tickets: TicketStoreRef) -> Self {
        Self { tickets }
    }

    /// Newest first. `limit` is clamped to `1..=MAX_PAGE_SIZE`.
    pub async fn list(
        &self,
        passenger: Passenger,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Result<TicketPage> {
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let offset = offset.unwrap_or(0);
        let (tickets, total) = self
            .tickets
            .list_by_user(passenger.user_id, limit, offset)
            .await?;
        Ok(TicketPage {
            tickets,
            total,
            limit,
            offset,
        })
    }

    pub async fn get(&self, passenger: Passenger, id: TicketId) -> Result<Ticket> {
        let ticket = self
            .tickets
            .get(id)
            .await?
            .ok_or_else(|| TicketingError::NotFound(format!("ticket {id}")))?;
        if ticket.user_id != passenger.user_id {
            return Err(TicketingError::Forbidden(format!(
                "ticket {id} belongs to another user"
            )));
        }
        Ok(ticket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::identity::UserId;
    use crate::domain::money::Amount;
    use crate::domain::ports::TicketStore;
    use crate::domain::ticket::{BatchId, NewTicket, PaymentMethod, PaymentStatus, RouteId};
    use crate::infrastructure::in_memory::InMemoryTicketStore;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn row(user: i64, qr: &str) -> NewTicket {
        NewTicket {
            user_id: UserId(user),
            route_id: RouteId(1),
            bus_name: "Green Line".to_string(),
            start_destination: "A".to_string(),
            end_destination: "B".to_string(),
            fare: Amount::new(dec!(10)).unwrap(),
            paid_status: true,
            qr_code: qr.to_string(),
            created_at: Utc::now(),
            batch_id: BatchId::generate(),
            payment_method: PaymentMethod::Wallet,
            payment_reference: "TICKET-x".to_string(),
            payment_used: true,
            payment_status: PaymentStatus::Paid,
        }
    }

    #[tokio::test]
    async fn test_list_is_newest_first_and_owner_scoped() {
        let store = InMemoryTicketStore::new();
        store
            .create_batch(vec![row(1, "a"), row(2, "b"), row(1, "c")])
            .await
            .unwrap();
        let queries = TicketQueries::new(Arc::new(store));
        let owner = Passenger { user_id: UserId(1) };

        let page = queries.list(owner, Some(1), None).await.unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.tickets[0].qr_code, "c");

        let page = queries.list(owner, Some(0), Some(1)).await.unwrap();
        assert_eq!(page.limit, 1);
        assert_eq!(page.tickets[0].qr_code, "a");

        assert!(matches!(
            queries.get(owner, TicketId(2)).await,
            Err(TicketingError::Forbidden(_))
        ));
        assert_eq!(queries.get(owner, TicketId(3)).await.unwrap().qr_code, "c");
    }
}

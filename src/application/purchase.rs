use crate::domain::identity::Passenger;
use crate::domain::messages::{FulfillmentRequest, Headers, TRACKING_ID_HEADER};
use crate::domain::ports::{FareCalculatorRef, StatusCacheRef, WorkQueueRef};
use crate::domain::ticket::{BatchId, PaymentMethod, RouteId};
use crate::domain::tracking::{TrackingId, TrackingStatus};
use crate::error::{Result, TicketingError};
use serde::Deserialize;

fn default_quantity() -> u32 {
    1
}

/// Body of `POST /tickets`.
#[derive(Debug, Clone, Deserialize)]
pub struct BuyTicketRequest {
    pub route_id: RouteId,
    pub bus_name: String,
    pub start_destination: String,
    pub end_destination: String,
    pub payment_method: PaymentMethod,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

impl BuyTicketRequest {
    fn validate(&self, max_quantity: u32) -> Result<()> {
        if self.quantity < 1 || self.quantity > max_quantity {
            return Err(TicketingError::Validation(format!(
                "quantity must be between 1 and {max_quantity}"
            )));
        }
        let required = [
            ("bus_name", &self.bus_name),
            ("start_destination", &self.start_destination),
            ("end_destination", &self.end_destination),
        ];
        if let Some((field, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(TicketingError::Validation(format!("{field} is required")));
        }
        if self.start_destination == self.end_destination {
            return Err(TicketingError::Validation(
                "start and end destination must differ".to_string(),
            ));
        }
        Ok(())
    }
}

/// Accepts purchases synchronously and hands them to the fulfillment queue.
///
/// Never waits on fulfillment: the caller gets a tracking id and polls the
/// status cache for the outcome. Batch ids are always minted here.
pub struct PurchaseRequestGateway {
    fares: FareCalculatorRef,
    statuses: StatusCacheRef,
    queue: WorkQueueRef<FulfillmentRequest>,
    max_quantity: u32,
}

impl PurchaseRequestGateway {
    pub fn new(
        fares: FareCalculatorRef,
        statuses: StatusCacheRef,
        queue: WorkQueueRef<FulfillmentRequest>,
        max_quantity: u32,
    ) -> Self {
        Self {
            fares,
            statuses,
            queue,
            max_quantity,
        }
    }

    pub async fn buy(&self, passenger: Passenger, request: BuyTicketRequest) -> Result<TrackingId> {
        request.validate(self.max_quantity)?;

        let fare = self
            .fares
            .fare(
                request.route_id,
                &request.start_destination,
                &request.end_destination,
            )
            .await?;
        let total_fare = fare.times(request.quantity)?;

        let tracking_id = TrackingId::generate();
        let batch_id = BatchId::generate();

        self.statuses
            .put(&tracking_id, TrackingStatus::pending())
            .await?;

        let message = FulfillmentRequest {
            user_id: passenger.user_id,
            route_id: request.route_id,
            bus_name: request.bus_name,
            start_destination: request.start_destination,
            end_destination: request.end_destination,
            fare,
            total_fare,
            quantity: request.quantity,
            batch_id: batch_id.clone(),
            payment_method: request.payment_method,
        };
        let headers = Headers::from([(TRACKING_ID_HEADER.to_string(), tracking_id.0.clone())]);

        if let Err(e) = self.queue.publish(message, headers).await {
            tracing::error!(%tracking_id, error = %e, "Failed to enqueue purchase");
            self.statuses
                .put(&tracking_id, TrackingStatus::failed("Failed to queue purchase"))
                .await?;
            return Err(e);
        }

        tracing::info!(
            %tracking_id,
            %batch_id,
            user_id = %passenger.user_id,
            quantity = request.quantity,
            total_fare = %total_fare,
            "Purchase accepted"
        );
        Ok(tracking_id)
    }

    /// Current status of a purchase, as the purchaser polls it.
    pub async fn status(&self, tracking_id: &TrackingId) -> Result<TrackingStatus> {
        self.statuses
            .get(tracking_id)
            .await?
            .ok_or_else(|| TicketingError::NotFound(format!("tracking id {tracking_id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::identity::UserId;
    use crate::domain::ports::WorkQueue;
    use crate::domain::tracking::TrackingState;
    use crate::infrastructure::fare_table::FareTable;
    use crate::infrastructure::in_memory::{InMemoryStatusCache, InMemoryWorkQueue};
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use std::time::Duration;

    fn gateway() -> (PurchaseRequestGateway, Arc<InMemoryWorkQueue<FulfillmentRequest>>) {
        let fares = FareTable::from_csv("route_id,name,order,fare\n1,A,1,0\n1,B,2,40".as_bytes())
            .unwrap();
        let queue = Arc::new(InMemoryWorkQueue::new());
        let purchase = PurchaseRequestGateway::new(
            Arc::new(fares),
            Arc::new(InMemoryStatusCache::new(Duration::from_secs(60))),
            queue.clone(),
            4,
        );
        (purchase, queue)
    }

    fn request(quantity: u32) -> BuyTicketRequest {
        BuyTicketRequest {
            route_id: RouteId(1),
            bus_name: "Green Line".to_string(),
            start_destination: "A".to_string(),
            end_destination: "B".to_string(),
            payment_method: PaymentMethod::Wallet,
            quantity,
        }
    }

    #[tokio::test]
    async fn test_buy_enqueues_and_returns_pending() {
        let (purchase, queue) = gateway();
        let passenger = Passenger { user_id: UserId(9) };

        let tracking_id = purchase.buy(passenger, request(2)).await.unwrap();
        assert_eq!(
            purchase.status(&tracking_id).await.unwrap().status,
            TrackingState::Pending
        );

        let delivery = queue.receive().await.unwrap();
        assert_eq!(delivery.header(TRACKING_ID_HEADER), Some(tracking_id.0.as_str()));
        assert_eq!(delivery.message.fare.value(), dec!(40));
        assert_eq!(delivery.message.total_fare.value(), dec!(80));
        assert_eq!(delivery.message.user_id, UserId(9));
    }

    #[tokio::test]
    async fn test_buy_rejects_zero_quantity_and_missing_fields() {
        let (purchase, _) = gateway();
        let passenger = Passenger { user_id: UserId(9) };

        assert!(matches!(
            purchase.buy(passenger, request(0)).await,
            Err(TicketingError::Validation(_))
        ));

        let mut missing = request(1);
        missing.bus_name = " ".to_string();
        assert!(matches!(
            purchase.buy(passenger, missing).await,
            Err(TicketingError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_buy_enforces_quantity_limit() {
        let (purchase, queue) = gateway();
        let passenger = Passenger { user_id: UserId(9) };

        let result = purchase.buy(passenger, request(5)).await;
        assert!(matches!(result, Err(TicketingError::Validation(msg)) if msg.contains("between 1 and 4")));
        assert!(matches!(
            purchase.buy(passenger, request(4_000_000_000)).await,
            Err(TicketingError::Validation(_))
        ));

        purchase.buy(passenger, request(4)).await.unwrap();
        assert_eq!(queue.receive().await.unwrap().message.quantity, 4);
    }

    #[tokio::test]
    async fn test_client_supplied_batch_id_is_ignored() {
        let (purchase, queue) = gateway();
        let request: BuyTicketRequest = serde_json::from_str(
            r#"{"route_id":1,"bus_name":"X","start_destination":"A","end_destination":"B","payment_method":"wallet","batch_id":"seed:1:100"}"#,
        )
        .unwrap();

        purchase.buy(Passenger { user_id: UserId(1) }, request).await.unwrap();

        let batch_id = queue.receive().await.unwrap().message.batch_id;
        assert_ne!(batch_id.0, "seed:1:100");
        assert!(uuid::Uuid::parse_str(&batch_id.0).is_ok());
    }

    #[test]
    fn test_quantity_defaults_to_one() {
        let request: BuyTicketRequest = serde_json::from_str(
            r#"{"route_id":1,"bus_name":"X","start_destination":"A","end_destination":"B","payment_method":"gateway"}"#,
        )
        .unwrap();
        assert_eq!(request.quantity, 1);
    }
}

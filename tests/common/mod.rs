#![allow(dead_code)]

use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use transit_ticketing::application::purchase::BuyTicketRequest;
use transit_ticketing::config::ServiceConfig;
use transit_ticketing::domain::identity::{Passenger, UserId};
use transit_ticketing::domain::messages::{CheckEvent, FulfillmentRequest};
use transit_ticketing::domain::money::Amount;
use transit_ticketing::domain::ports::WalletLedger;
use transit_ticketing::domain::ticket::PaymentMethod;
use transit_ticketing::domain::tracking::{TrackingId, TrackingStatus};
use transit_ticketing::domain::wallet::{CreditKind, LedgerEntry};
use transit_ticketing::infrastructure::fare_table::FareTable;
use transit_ticketing::infrastructure::gateway::SandboxGateway;
use transit_ticketing::infrastructure::in_memory::{
    InMemoryStatusCache, InMemoryTicketStore, InMemoryWalletLedger, InMemoryWorkQueue,
};
use transit_ticketing::runtime::{Ports, Runtime};

/// Route 1: cumulative fares 0, 20, 40, 55, 90.
pub const STOPS: &str = "route_id,name,order,fare
1,Central,1,0
1,Market,3,20
1,Harbour,5,40
1,University,7,55
1,Depot,9,90
2,Central,1,0
2,Airport,2,60
";

pub struct Harness {
    pub runtime: Runtime,
    pub tickets: Arc<InMemoryTicketStore>,
    pub ledger: Arc<InMemoryWalletLedger>,
    pub gateway: Arc<SandboxGateway>,
    pub fulfillment_queue: Arc<InMemoryWorkQueue<FulfillmentRequest>>,
    pub check_queue: Arc<InMemoryWorkQueue<CheckEvent>>,
}

impl Harness {
    pub fn new() -> Self {
        let tickets = Arc::new(InMemoryTicketStore::new());
        let ledger = Arc::new(InMemoryWalletLedger::new());
        let gateway = Arc::new(SandboxGateway::new("https://pay.test"));
        let fulfillment_queue = Arc::new(InMemoryWorkQueue::new());
        let check_queue = Arc::new(InMemoryWorkQueue::new());
        let fares = Arc::new(FareTable::from_csv(STOPS.as_bytes()).unwrap());

        let ports = Ports {
            tickets: tickets.clone(),
            ledger: ledger.clone(),
            statuses: Arc::new(InMemoryStatusCache::new(Duration::from_secs(60))),
            gateway: gateway.clone(),
            fares: fares.clone(),
            stops: fares,
            fulfillment_queue: fulfillment_queue.clone(),
            check_queue: check_queue.clone(),
        };
        let runtime = Runtime::new(ports, ServiceConfig::new("https://transit.test"));

        Self {
            runtime,
            tickets,
            ledger,
            gateway,
            fulfillment_queue,
            check_queue,
        }
    }

    pub async fn top_up(&self, user_id: i64, amount: Decimal) {
        let entry = LedgerEntry::new(
            format!("seed:{user_id}:{amount}"),
            "Initial balance",
            PaymentMethod::Gateway,
        );
        self.ledger
            .credit(
                UserId(user_id),
                Amount::new(amount).unwrap(),
                CreditKind::Credit,
                entry,
            )
            .await
            .unwrap();
    }

    /// Accepts a purchase and runs fulfillment for it.
    pub async fn purchase(
        &self,
        user_id: i64,
        from: &str,
        to: &str,
        method: PaymentMethod,
        quantity: u32,
    ) -> TrackingStatus {
        let tracking_id = self.accept(user_id, from, to, method, quantity).await;
        self.runtime.fulfillment_consumer().process_next().await.unwrap();
        self.runtime.state.purchases.status(&tracking_id).await.unwrap()
    }

    /// Accepts a purchase without fulfilling it.
    pub async fn accept(
        &self,
        user_id: i64,
        from: &str,
        to: &str,
        method: PaymentMethod,
        quantity: u32,
    ) -> TrackingId {
        self.runtime
            .state
            .purchases
            .buy(passenger(user_id), buy_request(from, to, method, quantity))
            .await
            .unwrap()
    }
}

pub fn passenger(user_id: i64) -> Passenger {
    Passenger {
        user_id: UserId(user_id),
    }
}

pub fn buy_request(from: &str, to: &str, method: PaymentMethod, quantity: u32) -> BuyTicketRequest {
    BuyTicketRequest {
        route_id: transit_ticketing::domain::ticket::RouteId(1),
        bus_name: "Harbour Express".to_string(),
        start_destination: from.to_string(),
        end_destination: to.to_string(),
        payment_method: method,
        quantity,
    }
}

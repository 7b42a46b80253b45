//! Wires ports into services, worker pools and the HTTP router.

use crate::application::cancellation::CancellationService;
use crate::application::consumer::QueueConsumer;
use crate::application::fulfillment::TicketFulfillmentWorker;
use crate::application::purchase::PurchaseRequestGateway;
use crate::application::reconciler::PaymentReconciler;
use crate::application::tickets::TicketQueries;
use crate::application::validation::{
    CheckEventPublisher, CheckEventWorker, TicketValidationEngine,
};
use crate::application::wallet::WalletService;
use crate::config::ServiceConfig;
use crate::domain::messages::{CheckEvent, FulfillmentRequest, TICKET_CHECK_QUEUE, TICKET_QUEUE};
use crate::domain::ports::{
    FareCalculatorRef, PaymentGatewayRef, StatusCacheRef, StopDirectoryRef, TicketStoreRef,
    WalletLedgerRef, WorkQueueRef,
};
use crate::interfaces::http::{self, AppState};
use axum::Router;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Every adapter the services depend on.
#[derive(Clone)]
pub struct Ports {
    pub tickets: TicketStoreRef,
    pub ledger: WalletLedgerRef,
    pub statuses: StatusCacheRef,
    pub gateway: PaymentGatewayRef,
    pub fares: FareCalculatorRef,
    pub stops: StopDirectoryRef,
    pub fulfillment_queue: WorkQueueRef<FulfillmentRequest>,
    pub check_queue: WorkQueueRef<CheckEvent>,
}

pub struct Runtime {
    pub state: AppState,
    fulfillment: QueueConsumer<FulfillmentRequest>,
    checks: QueueConsumer<CheckEvent>,
    workers: usize,
}

impl Runtime {
    pub fn new(ports: Ports, config: ServiceConfig) -> Self {
        let validation = Arc::new(TicketValidationEngine::new(
            ports.tickets.clone(),
            ports.stops.clone(),
            ports.fares.clone(),
        ));

        let fulfillment = QueueConsumer::new(
            TICKET_QUEUE,
            ports.fulfillment_queue.clone(),
            Arc::new(TicketFulfillmentWorker::new(
                ports.tickets.clone(),
                ports.ledger.clone(),
                ports.gateway.clone(),
                ports.statuses.clone(),
                config.clone(),
            )),
            config.max_delivery_attempts,
        );
        let checks = QueueConsumer::new(
            TICKET_CHECK_QUEUE,
            ports.check_queue.clone(),
            Arc::new(CheckEventWorker::new(validation.clone())),
            config.max_delivery_attempts,
        );

        let state = AppState {
            purchases: Arc::new(PurchaseRequestGateway::new(
                ports.fares.clone(),
                ports.statuses.clone(),
                ports.fulfillment_queue.clone(),
                config.max_tickets_per_purchase,
            )),
            tickets: Arc::new(TicketQueries::new(ports.tickets.clone())),
            reconciler: Arc::new(PaymentReconciler::new(
                ports.tickets.clone(),
                ports.gateway.clone(),
                ports.ledger.clone(),
            )),
            validation,
            check_events: Arc::new(CheckEventPublisher::new(ports.check_queue.clone())),
            cancellations: Arc::new(CancellationService::new(
                ports.tickets.clone(),
                ports.ledger.clone(),
            )),
            wallets: Arc::new(WalletService::new(
                ports.ledger.clone(),
                ports.gateway.clone(),
                config.clone(),
            )),
            fulfillment_queue: ports.fulfillment_queue,
            check_queue: ports.check_queue,
        };

        Self {
            state,
            fulfillment,
            checks,
            workers: config.workers,
        }
    }

    pub fn router(&self) -> Router {
        http::router(self.state.clone())
    }

    /// Consumer for `ticket_queue`, for driving fulfillment one message at a time.
    pub fn fulfillment_consumer(&self) -> &QueueConsumer<FulfillmentRequest> {
        &self.fulfillment
    }

    pub fn check_consumer(&self) -> &QueueConsumer<CheckEvent> {
        &self.checks
    }

    /// Starts both consumer pools; they stop when `shutdown` turns true.
    pub fn spawn_workers(&self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let mut handles = self
            .fulfillment
            .clone()
            .spawn_pool(self.workers, shutdown.clone());
        handles.extend(self.checks.clone().spawn_pool(self.workers, shutdown));
        tracing::info!(workers = self.workers, "Worker pools started");
        handles
    }
}

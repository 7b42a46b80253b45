//! REST surface.
//!
//! JSON endpoints answer with the `{success, data, message}` envelope, errors
//! with `{success: false, error: {code, message}}`. The gateway redirect
//! targets render small HTML pages instead.

pub mod handlers;
pub mod identity;
pub mod response;

use crate::application::cancellation::CancellationService;
use crate::application::purchase::PurchaseRequestGateway;
use crate::application::reconciler::PaymentReconciler;
use crate::application::tickets::TicketQueries;
use crate::application::validation::{CheckEventPublisher, TicketValidationEngine};
use crate::application::wallet::WalletService;
use crate::domain::messages::{CheckEvent, FulfillmentRequest};
use crate::domain::ports::WorkQueueRef;
use axum::Router;
use axum::routing::{get, post};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Services shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub purchases: Arc<PurchaseRequestGateway>,
    pub tickets: Arc<TicketQueries>,
    pub reconciler: Arc<PaymentReconciler>,
    pub validation: Arc<TicketValidationEngine>,
    pub check_events: Arc<CheckEventPublisher>,
    pub cancellations: Arc<CancellationService>,
    pub wallets: Arc<WalletService>,
    pub fulfillment_queue: WorkQueueRef<FulfillmentRequest>,
    pub check_queue: WorkQueueRef<CheckEvent>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route(
            "/tickets",
            get(handlers::list_tickets).post(handlers::buy_ticket),
        )
        .route("/tickets/:id", get(handlers::get_ticket))
        .route("/tickets/:id/cancel", post(handlers::cancel_ticket))
        .route("/ticket/status", get(handlers::ticket_status))
        .route("/ticket/payment/success", get(handlers::payment_success))
        .route("/ticket/payment/fail", get(handlers::payment_fail))
        .route("/ticket/payment/cancel", get(handlers::payment_cancel))
        .route("/bus/check-ticket", post(handlers::check_ticket))
        .route("/bus/validate-ticket", post(handlers::validate_ticket))
        .route("/bus/check-events", post(handlers::submit_check_events))
        .route("/wallet/balance", get(handlers::wallet_balance))
        .route("/wallet/transactions", get(handlers::wallet_transactions))
        .route("/wallet/recharge", post(handlers::init_recharge))
        .route("/wallet/recharge/success", get(handlers::recharge_success))
        .route("/wallet/recharge/fail", get(handlers::recharge_fail))
        .route("/wallet/recharge/cancel", get(handlers::recharge_cancel))
        .route("/ops/dead-letters", get(handlers::dead_letters))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

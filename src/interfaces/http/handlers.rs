use super::AppState;
use super::response::{success, with_status};
use crate::application::purchase::BuyTicketRequest;
use crate::application::reconciler::Reconciliation;
use crate::application::validation::{CheckTicketRequest, ValidateTicketRequest};
use crate::application::wallet::RechargeRequest;
use crate::domain::identity::{Conductor, Passenger};
use crate::domain::messages::{CheckEvent, DeadLetter, FulfillmentRequest};
use crate::domain::money::Amount;
use crate::domain::ticket::TicketId;
use crate::domain::tracking::TrackingId;
use crate::error::{Result, TicketingError};
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Serialize)]
struct HealthPayload {
    status: &'static str,
    service: &'static str,
}

pub async fn health_check() -> Response {
    let payload = HealthPayload {
        status: "ok",
        service: "transit-ticketing",
    };
    success(payload, "Health check successful")
}

pub async fn buy_ticket(
    State(state): State<AppState>,
    passenger: Passenger,
    Json(request): Json<BuyTicketRequest>,
) -> Result<Response> {
    let tracking_id = state.purchases.buy(passenger, request).await?;
    Ok(with_status(
        StatusCode::ACCEPTED,
        json!({ "tracking_id": tracking_id }),
        "Ticket purchase is being processed",
    ))
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

pub async fn list_tickets(
    State(state): State<AppState>,
    passenger: Passenger,
    Query(page): Query<PageQuery>,
) -> Result<Response> {
    let page = state.tickets.list(passenger, page.limit, page.offset).await?;
    Ok(success(page, "Tickets retrieved"))
}

pub async fn get_ticket(
    State(state): State<AppState>,
    passenger: Passenger,
    Path(id): Path<i64>,
) -> Result<Response> {
    let ticket = state.tickets.get(passenger, TicketId(id)).await?;
    Ok(success(ticket, "Ticket retrieved"))
}

pub async fn cancel_ticket(
    State(state): State<AppState>,
    passenger: Passenger,
    Path(id): Path<i64>,
) -> Result<Response> {
    let cancellation = state.cancellations.cancel(passenger, TicketId(id)).await?;
    let message = cancellation.message.clone();
    Ok(success(cancellation, message))
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub tracking_id: Option<String>,
    pub id: Option<i64>,
}

/// Purchase status by tracking id, or payment status by ticket id.
pub async fn ticket_status(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> Result<Response> {
    match (query.tracking_id, query.id) {
        (Some(tracking_id), _) => {
            let status = state.purchases.status(&TrackingId(tracking_id)).await?;
            Ok(success(status, "Status retrieved"))
        }
        (None, Some(id)) => {
            let status = state.reconciler.payment_status(TicketId(id)).await?;
            Ok(success(json!({ "status": status }), "Payment status retrieved"))
        }
        (None, None) => Err(TicketingError::Validation(
            "tracking_id or id is required".to_string(),
        )),
    }
}

/// Query string the gateway sends back on its redirects.
#[derive(Debug, Deserialize)]
pub struct PaymentCallback {
    pub id: Option<i64>,
    pub tran_id: Option<String>,
    pub val_id: Option<String>,
    pub amount: Option<Amount>,
}

impl PaymentCallback {
    async fn transaction_id(&self, state: &AppState) -> Result<String> {
        match (&self.tran_id, self.id) {
            (Some(tran_id), _) => Ok(tran_id.clone()),
            (None, Some(id)) => state.reconciler.transaction_for_ticket(TicketId(id)).await,
            (None, None) => Err(TicketingError::Validation(
                "tran_id or id is required".to_string(),
            )),
        }
    }
}

fn payment_page(status: StatusCode, title: &str, detail: &str) -> Response {
    let body = format!(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>{title}</title></head>\n\
         <body>\n<h1>{title}</h1>\n<p>{detail}</p>\n</body>\n</html>\n"
    );
    (status, Html(body)).into_response()
}

fn callback_page(outcome: Result<Reconciliation>, title: &str, detail: &str) -> Response {
    match outcome {
        Ok(_) => payment_page(StatusCode::OK, title, detail),
        Err(e) => {
            tracing::warn!(error = %e, "Payment callback rejected");
            payment_page(e.status_code(), "Payment not processed", &e.public_message())
        }
    }
}

pub async fn payment_success(
    State(state): State<AppState>,
    Query(callback): Query<PaymentCallback>,
) -> Response {
    let outcome = async {
        let transaction_id = callback.transaction_id(&state).await?;
        let (Some(validation_id), Some(amount)) = (&callback.val_id, callback.amount) else {
            return Err(TicketingError::Validation(
                "val_id and amount are required".to_string(),
            ));
        };
        state
            .reconciler
            .confirm(&transaction_id, validation_id, amount)
            .await
    }
    .await;
    callback_page(
        outcome,
        "Payment successful",
        "Your tickets are paid and ready to use.",
    )
}

pub async fn payment_fail(
    State(state): State<AppState>,
    Query(callback): Query<PaymentCallback>,
) -> Response {
    let outcome = match callback.transaction_id(&state).await {
        Ok(transaction_id) => state.reconciler.fail(&transaction_id).await,
        Err(e) => Err(e),
    };
    callback_page(outcome, "Payment failed", "Your payment could not be completed.")
}

pub async fn payment_cancel(
    State(state): State<AppState>,
    Query(callback): Query<PaymentCallback>,
) -> Response {
    let outcome = match callback.transaction_id(&state).await {
        Ok(transaction_id) => state.reconciler.cancel(&transaction_id).await,
        Err(e) => Err(e),
    };
    callback_page(outcome, "Payment cancelled", "You cancelled the payment.")
}

pub async fn check_ticket(
    State(state): State<AppState>,
    Json(request): Json<CheckTicketRequest>,
) -> Result<Response> {
    let result = state.validation.check(request).await?;
    Ok(success(result, "Ticket checked"))
}

pub async fn validate_ticket(
    State(state): State<AppState>,
    conductor: Conductor,
    Json(request): Json<ValidateTicketRequest>,
) -> Result<Response> {
    let result = state.validation.validate(&conductor, request).await?;
    Ok(success(result, "Ticket validated"))
}

pub async fn submit_check_events(
    State(state): State<AppState>,
    Json(events): Json<Vec<CheckEvent>>,
) -> Result<Response> {
    let queued = state.check_events.publish(events).await?;
    Ok(with_status(
        StatusCode::ACCEPTED,
        json!({ "queued": queued }),
        "Check events queued",
    ))
}

pub async fn wallet_balance(
    State(state): State<AppState>,
    passenger: Passenger,
) -> Result<Response> {
    let balance = state.wallets.balance(passenger).await?;
    Ok(success(json!({ "balance": balance }), "Balance retrieved"))
}

pub async fn wallet_transactions(
    State(state): State<AppState>,
    passenger: Passenger,
) -> Result<Response> {
    let transactions = state.wallets.transactions(passenger).await?;
    Ok(success(transactions, "Transactions retrieved"))
}

pub async fn init_recharge(
    State(state): State<AppState>,
    passenger: Passenger,
    Json(request): Json<RechargeRequest>,
) -> Result<Response> {
    let session = state.wallets.init_recharge(passenger, request).await?;
    Ok(success(session, "Recharge initialised"))
}

#[derive(Debug, Deserialize)]
pub struct RechargeCallback {
    pub tran_id: String,
    pub val_id: Option<String>,
    pub amount: Option<Amount>,
}

pub async fn recharge_success(
    State(state): State<AppState>,
    Query(callback): Query<RechargeCallback>,
) -> Response {
    let outcome = match (&callback.val_id, callback.amount) {
        (Some(validation_id), Some(amount)) => {
            state
                .wallets
                .complete_recharge(&callback.tran_id, validation_id, amount)
                .await
        }
        _ => Err(TicketingError::Validation(
            "val_id and amount are required".to_string(),
        )),
    };
    match outcome {
        Ok(tx) => payment_page(
            StatusCode::OK,
            "Recharge successful",
            &format!("{} was added to your wallet.", tx.amount),
        ),
        Err(e) => payment_page(e.status_code(), "Recharge not processed", &e.public_message()),
    }
}

pub async fn recharge_fail(
    State(state): State<AppState>,
    Query(callback): Query<RechargeCallback>,
) -> Result<Response> {
    state
        .wallets
        .abandon_recharge(&callback.tran_id, "failed")
        .await?;
    Ok(payment_page(StatusCode::OK, "Recharge failed", "Your wallet was not charged."))
}

pub async fn recharge_cancel(
    State(state): State<AppState>,
    Query(callback): Query<RechargeCallback>,
) -> Result<Response> {
    state
        .wallets
        .abandon_recharge(&callback.tran_id, "cancelled")
        .await?;
    Ok(payment_page(StatusCode::OK, "Recharge cancelled", "Your wallet was not charged."))
}

#[derive(Serialize)]
struct DeadLetters {
    fulfillment: Vec<DeadLetter<FulfillmentRequest>>,
    checks: Vec<DeadLetter<CheckEvent>>,
}

pub async fn dead_letters(State(state): State<AppState>) -> Result<Response> {
    let letters = DeadLetters {
        fulfillment: state.fulfillment_queue.dead_letters().await?,
        checks: state.check_queue.dead_letters().await?,
    };
    Ok(success(letters, "Dead letters retrieved"))
}

use super::consumer::MessageHandler;
use crate::domain::identity::Conductor;
use crate::domain::messages::{CheckEvent, Delivery, Headers};
use crate::domain::money::Amount;
use crate::domain::ports::{FareCalculatorRef, StopDirectoryRef, TicketStoreRef, WorkQueueRef};
use crate::domain::stop::CurrentStoppage;
use crate::domain::ticket::{RouteId, Ticket, TicketId};
use crate::error::{Result, TicketingError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Body of `POST /bus/check-ticket`.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckTicketRequest {
    pub qr_code: String,
    pub route_id: RouteId,
    pub current_stoppage: CurrentStoppage,
}

/// Body of `POST /bus/validate-ticket`. The route comes from the conductor.
#[derive(Debug, Clone, Deserialize)]
pub struct ValidateTicketRequest {
    pub ticket_id: TicketId,
    #[serde(default)]
    pub current_stoppage: Option<CurrentStoppage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Valid,
    OverTravel,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckResult {
    pub status: CheckStatus,
    pub ticket: Ticket,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra_fare: Option<Amount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Checks tickets in at a checkpoint.
///
/// Interactive validation, QR scans and queued check events share one
/// ordering of checks and one atomic `checked` transition.
pub struct TicketValidationEngine {
    tickets: TicketStoreRef,
    stops: StopDirectoryRef,
    fares: FareCalculatorRef,
}

impl TicketValidationEngine {
    pub fn new(tickets: TicketStoreRef, stops: StopDirectoryRef, fares: FareCalculatorRef) -> Self {
        Self {
            tickets,
            stops,
            fares,
        }
    }

    /// QR scan from a bus device.
    pub async fn check(&self, request: CheckTicketRequest) -> Result<CheckResult> {
        let ticket = self
            .tickets
            .get_by_qr(&request.qr_code)
            .await?
            .ok_or_else(|| TicketingError::NotFound("ticket not found".to_string()))?;
        self.check_in(ticket, request.route_id, Some(&request.current_stoppage))
            .await
    }

    /// Interactive validation by an authenticated conductor.
    pub async fn validate(
        &self,
        conductor: &Conductor,
        request: ValidateTicketRequest,
    ) -> Result<CheckResult> {
        let ticket = self.ticket(request.ticket_id).await?;
        tracing::debug!(
            ticket_id = %ticket.id,
            registration = %conductor.registration_number,
            "Conductor validating ticket"
        );
        self.check_in(ticket, conductor.route_id, request.current_stoppage.as_ref())
            .await
    }

    /// One event from `ticket_check_queue`.
    pub async fn check_event(&self, event: &CheckEvent) -> Result<CheckResult> {
        let ticket = self.ticket(event.ticket_id).await?;
        self.check_in(ticket, event.route_id, Some(&event.current_stoppage))
            .await
    }

    async fn ticket(&self, id: TicketId) -> Result<Ticket> {
        self.tickets
            .get(id)
            .await?
            .ok_or_else(|| TicketingError::NotFound(format!("ticket {id}")))
    }

    async fn check_in(
        &self,
        ticket: Ticket,
        route_id: RouteId,
        current: Option<&CurrentStoppage>,
    ) -> Result<CheckResult> {
        ensure_checkable(&ticket, route_id)?;

        let extra_fare = match current {
            Some(current) => self.over_travel_fare(&ticket, current).await?,
            None => None,
        };

        let checked = match self.tickets.mark_checked(ticket.id).await? {
            Some(checked) => checked,
            None => {
                // Lost the race to another scan or a cancellation.
                let latest = self.ticket(ticket.id).await?;
                ensure_checkable(&latest, route_id)?;
                return Err(TicketingError::Conflict("already checked".to_string()));
            }
        };

        let result = match extra_fare {
            Some(extra) => {
                tracing::warn!(ticket_id = %checked.id, extra_fare = %extra, "Over-travel detected");
                CheckResult {
                    status: CheckStatus::OverTravel,
                    ticket: checked,
                    extra_fare: Some(extra),
                    message: Some(format!(
                        "You have over-traveled. Please pay extra fare: {extra}"
                    )),
                }
            }
            None => {
                tracing::info!(ticket_id = %checked.id, %route_id, "Ticket checked in");
                CheckResult {
                    status: CheckStatus::Valid,
                    ticket: checked,
                    extra_fare: None,
                    message: None,
                }
            }
        };
        Ok(result)
    }

    /// Fare from the ticket's destination to `current` when the bus is
    /// already past the destination. The order reported by the bus must match
    /// the route's own order for that stop.
    async fn over_travel_fare(
        &self,
        ticket: &Ticket,
        current: &CurrentStoppage,
    ) -> Result<Option<Amount>> {
        let destination = self
            .stops
            .stop(ticket.route_id, &ticket.end_destination)
            .await?
            .ok_or_else(|| {
                TicketingError::NotFound(format!(
                    "stop '{}' on route {}",
                    ticket.end_destination, ticket.route_id
                ))
            })?;

        let current = self
            .stops
            .stop(ticket.route_id, &current.name)
            .await?
            .filter(|stop| stop.order == current.order)
            .ok_or_else(|| {
                TicketingError::Validation(format!(
                    "current stop '{}' with order {} is not on route {}",
                    current.name, current.order, ticket.route_id
                ))
            })?;

        if current.order <= destination.order {
            return Ok(None);
        }
        let extra = self
            .fares
            .fare(ticket.route_id, &destination.name, &current.name)
            .await?;
        Ok(Some(extra))
    }
}

fn ensure_checkable(ticket: &Ticket, route_id: RouteId) -> Result<()> {
    if ticket.is_cancelled() {
        return Err(TicketingError::Conflict("cancelled".to_string()));
    }
    if !ticket.paid_status {
        return Err(TicketingError::Conflict("unpaid".to_string()));
    }
    if ticket.route_id != route_id {
        return Err(TicketingError::Conflict("wrong route".to_string()));
    }
    if ticket.checked {
        return Err(TicketingError::Conflict("already checked".to_string()));
    }
    Ok(())
}

/// Enqueues scans batched up by bus devices.
pub struct CheckEventPublisher {
    queue: WorkQueueRef<CheckEvent>,
}

impl CheckEventPublisher {
    pub fn new(queue: WorkQueueRef<CheckEvent>) -> Self {
        Self { queue }
    }

    pub async fn publish(&self, events: Vec<CheckEvent>) -> Result<usize> {
        if events.is_empty() {
            return Err(TicketingError::Validation(
                "at least one check event is required".to_string(),
            ));
        }
        let count = events.len();
        for event in events {
            self.queue.publish(event, Headers::new()).await?;
        }
        tracing::info!(count, "Check events queued");
        Ok(count)
    }
}

/// Consumes `ticket_check_queue`.
pub struct CheckEventWorker {
    engine: Arc<TicketValidationEngine>,
}

impl CheckEventWorker {
    pub fn new(engine: Arc<TicketValidationEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl MessageHandler<CheckEvent> for CheckEventWorker {
    async fn handle(&self, delivery: &Delivery<CheckEvent>) -> Result<()> {
        match self.engine.check_event(&delivery.message).await {
            Ok(result) => {
                tracing::info!(
                    ticket_id = %delivery.message.ticket_id,
                    status = ?result.status,
                    "Check event processed"
                );
                Ok(())
            }
            Err(e) if e.is_retryable() => Err(e),
            Err(e) => {
                tracing::warn!(
                    ticket_id = %delivery.message.ticket_id,
                    delivery_tag = delivery.tag,
                    error = %e,
                    "Check event rejected"
                );
                Ok(())
            }
        }
    }

    async fn abandon(&self, delivery: &Delivery<CheckEvent>, error: &TicketingError) {
        tracing::error!(
            ticket_id = %delivery.message.ticket_id,
            error = %error,
            "Check event abandoned"
        );
    }
}

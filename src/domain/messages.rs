//! Work queue message contracts.

use super::identity::UserId;
use super::money::Amount;
use super::stop::CurrentStoppage;
use super::ticket::{BatchId, PaymentMethod, RouteId, TicketId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const TICKET_QUEUE: &str = "ticket_queue";
pub const TICKET_CHECK_QUEUE: &str = "ticket_check_queue";

/// Header carrying the purchaser's tracking id on `ticket_queue` messages.
pub const TRACKING_ID_HEADER: &str = "tracking_id";

/// `ticket_queue` payload: one purchase to fulfil.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FulfillmentRequest {
    pub user_id: UserId,
    pub route_id: RouteId,
    pub bus_name: String,
    pub start_destination: String,
    pub end_destination: String,
    pub fare: Amount,
    pub total_fare: Amount,
    pub quantity: u32,
    pub batch_id: BatchId,
    pub payment_method: PaymentMethod,
}

/// `ticket_check_queue` payload: one scan from a bus device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckEvent {
    pub ticket_id: TicketId,
    pub route_id: RouteId,
    pub current_stoppage: CurrentStoppage,
}

pub type Headers = BTreeMap<String, String>;

/// A message handed out by a `WorkQueue`, in flight until acked.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery<M> {
    pub tag: u64,
    pub message: M,
    pub headers: Headers,
    /// 1 on first delivery, incremented on every retry.
    pub attempt: u32,
}

impl<M> Delivery<M> {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

/// A message that exhausted its retries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetter<M> {
    pub message: M,
    pub headers: Headers,
    pub attempts: u32,
    pub error: String,
}

/// Queue-side record of a message; shared by the queue adapters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedMessage<M> {
    pub message: M,
    pub headers: Headers,
    pub attempt: u32,
}

impl<M> QueuedMessage<M> {
    pub fn new(message: M, headers: Headers) -> Self {
        Self {
            message,
            headers,
            attempt: 0,
        }
    }

    pub fn into_delivery(self, tag: u64) -> Delivery<M> {
        Delivery {
            tag,
            message: self.message,
            headers: self.headers,
            attempt: self.attempt,
        }
    }

    pub fn into_dead_letter(self, error: String) -> DeadLetter<M> {
        DeadLetter {
            message: self.message,
            headers: self.headers,
            attempts: self.attempt,
            error,
        }
    }
}

use super::ticket::TicketId;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Client-facing handle for polling an asynchronous purchase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackingId(pub String);

impl TrackingId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for TrackingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackingState {
    Pending,
    Paid,
    Ready,
    Failed,
}

/// The status blob a purchaser polls for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingStatus {
    pub status: TrackingState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticket_id: Option<TicketId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ticket_ids: Vec<TicketId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TrackingStatus {
    pub fn pending() -> Self {
        Self {
            status: TrackingState::Pending,
            url: None,
            ticket_id: None,
            ticket_ids: Vec::new(),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: TrackingState::Failed,
            error: Some(error.into()),
            ..Self::pending()
        }
    }

    /// Wallet purchase completed; `url` points at the first ticket.
    pub fn paid(ticket_ids: Vec<TicketId>) -> Self {
        let first = ticket_ids.first().copied();
        Self {
            status: TrackingState::Paid,
            url: first.map(|id| format!("/tickets/{id}")),
            ticket_id: first,
            ticket_ids,
            error: None,
        }
    }

    /// Gateway session opened; `url` is where the purchaser must go to pay.
    pub fn ready(gateway_url: String, ticket_ids: Vec<TicketId>) -> Self {
        Self {
            status: TrackingState::Ready,
            url: Some(gateway_url),
            ticket_id: ticket_ids.first().copied(),
            ticket_ids,
            error: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == TrackingState::Pending
    }
}

use super::ticket::RouteId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A stop on a route, as loaded into the stop catalogue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    pub route_id: RouteId,
    pub name: String,
    /// Position along the route; strictly increasing from the origin.
    pub order: i32,
    /// Fare from the route origin to this stop.
    pub fare: Decimal,
}

/// The stop a bus reports when scanning a ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentStoppage {
    pub name: String,
    pub order: i32,
}

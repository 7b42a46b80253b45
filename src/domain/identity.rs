//! Authenticated identities.
//!
//! The auth layer resolves credentials once and hands the services one of
//! these values; nothing below the HTTP extractors ever inspects raw claims.

use super::ticket::RouteId;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A signed-in passenger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Passenger {
    pub user_id: UserId,
}

/// A signed-in bus device, bound to the route it is operating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conductor {
    pub registration_number: String,
    pub route_id: RouteId,
}

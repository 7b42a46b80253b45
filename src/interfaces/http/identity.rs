//! Identity extractors.
//!
//! Credentials are verified upstream by the auth proxy, which forwards the
//! resolved identity in request headers. These extractors turn those headers
//! into typed identities once, at the edge.

use crate::domain::identity::{Conductor, Passenger, UserId};
use crate::domain::ticket::RouteId;
use crate::error::TicketingError;
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const BUS_REGISTRATION_HEADER: &str = "x-bus-registration";
pub const BUS_ROUTE_HEADER: &str = "x-bus-route-id";

fn header<'a>(parts: &'a Parts, name: &str) -> Result<&'a str, TicketingError> {
    parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| TicketingError::Auth(format!("missing {name} header")))
}

fn numeric_header(parts: &Parts, name: &str) -> Result<i64, TicketingError> {
    header(parts, name)?
        .parse()
        .map_err(|_| TicketingError::Auth(format!("malformed {name} header")))
}

#[async_trait]
impl<S> FromRequestParts<S> for Passenger
where
    S: Send + Sync,
{
    type Rejection = TicketingError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = numeric_header(parts, USER_ID_HEADER)?;
        Ok(Passenger {
            user_id: UserId(user_id),
        })
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Conductor
where
    S: Send + Sync,
{
    type Rejection = TicketingError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let registration_number = header(parts, BUS_REGISTRATION_HEADER)?.to_string();
        let route_id = numeric_header(parts, BUS_ROUTE_HEADER)?;
        Ok(Conductor {
            registration_number,
            route_id: RouteId(route_id),
        })
    }
}

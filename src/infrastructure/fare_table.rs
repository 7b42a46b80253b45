use crate::domain::money::Amount;
use crate::domain::ports::{FareCalculator, StopDirectory};
use crate::domain::stop::Stop;
use crate::domain::ticket::RouteId;
use crate::error::{Result, TicketingError};
use crate::interfaces::csv::stop_reader::StopReader;
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::Read;

/// Stop catalogue with distance-based fares.
///
/// Each stop carries the cumulative fare from its route origin, so the fare
/// between two stops is the difference of their cumulative fares.
#[derive(Debug, Clone, Default)]
pub struct FareTable {
    routes: HashMap<RouteId, Vec<Stop>>,
}

impl FareTable {
    /// Builds a table, rejecting duplicate stop names or orders and fares
    /// that decrease along a route.
    pub fn from_stops(stops: impl IntoIterator<Item = Stop>) -> Result<Self> {
        let mut routes: HashMap<RouteId, Vec<Stop>> = HashMap::new();
        for stop in stops {
            routes.entry(stop.route_id).or_default().push(stop);
        }

        for (route_id, stops) in routes.iter_mut() {
            stops.sort_by_key(|s| s.order);
            for pair in stops.windows(2) {
                if pair[0].order == pair[1].order {
                    return Err(TicketingError::Validation(format!(
                        "route {route_id}: order {} used twice",
                        pair[0].order
                    )));
                }
                if pair[1].fare < pair[0].fare {
                    return Err(TicketingError::Validation(format!(
                        "route {route_id}: fare decreases at stop '{}'",
                        pair[1].name
                    )));
                }
            }
            for (i, stop) in stops.iter().enumerate() {
                if stops[..i].iter().any(|s| s.name == stop.name) {
                    return Err(TicketingError::Validation(format!(
                        "route {route_id}: stop '{}' listed twice",
                        stop.name
                    )));
                }
            }
        }

        Ok(Self { routes })
    }

    pub fn from_csv<R: Read>(source: R) -> Result<Self> {
        let stops = StopReader::new(source).stops().collect::<Result<Vec<_>>>()?;
        Self::from_stops(stops)
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    fn find(&self, route_id: RouteId, name: &str) -> Option<&Stop> {
        self.routes
            .get(&route_id)
            .and_then(|stops| stops.iter().find(|s| s.name == name))
    }

    fn require(&self, route_id: RouteId, name: &str) -> Result<&Stop> {
        self.find(route_id, name)
            .ok_or_else(|| TicketingError::NotFound(format!("stop '{name}' on route {route_id}")))
    }
}

#[async_trait]
impl FareCalculator for FareTable {
    async fn fare(&self, route_id: RouteId, from: &str, to: &str) -> Result<Amount> {
        let from = self.require(route_id, from)?;
        let to = self.require(route_id, to)?;
        Amount::new((to.fare - from.fare).abs()).map_err(|_| {
            TicketingError::Validation(format!(
                "no fare between '{}' and '{}' on route {route_id}",
                from.name, to.name
            ))
        })
    }
}

#[async_trait]
impl StopDirectory for FareTable {
    async fn stop(&self, route_id: RouteId, name: &str) -> Result<Option<Stop>> {
        Ok(self.find(route_id, name).cloned())
    }
}

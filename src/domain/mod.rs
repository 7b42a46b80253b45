//! Domain types and the ports the application layer depends on.

pub mod identity;
pub mod messages;
pub mod money;
pub mod ports;
pub mod stop;
pub mod ticket;
pub mod tracking;
pub mod wallet;

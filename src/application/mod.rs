//! Application services.
//!
//! Each service is built from the `Arc<dyn Port>` collaborators it needs and
//! nothing else. Purchases are accepted by [`purchase::PurchaseRequestGateway`]
//! and fulfilled asynchronously by [`fulfillment::TicketFulfillmentWorker`]
//! running inside a [`consumer::QueueConsumer`] pool.

pub mod cancellation;
pub mod consumer;
pub mod fulfillment;
pub mod purchase;
pub mod reconciler;
pub mod tickets;
pub mod validation;
pub mod wallet;

//! Sandbox payment gateway for development and testing.
//!
//! Mimics a hosted-checkout provider: `init_payment` opens a session and
//! returns a checkout URL, and the provider later redirects the payer to the
//! success URL with a validation id that `validate_payment` accepts. In
//! production this is replaced by a real provider adapter.

use crate::domain::money::Amount;
use crate::domain::ports::PaymentGateway;
use crate::error::{Result, TicketingError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutSession {
    pub amount: Amount,
    pub validation_id: String,
    pub success_url: String,
    pub fail_url: String,
    pub cancel_url: String,
}

#[derive(Clone)]
pub struct SandboxGateway {
    base_url: String,
    sessions: Arc<RwLock<HashMap<String, CheckoutSession>>>,
    unavailable: Arc<AtomicBool>,
}

impl SandboxGateway {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            sessions: Arc::default(),
            unavailable: Arc::default(),
        }
    }

    /// Makes every subsequent `init_payment` fail, as if the provider were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// The session opened for `transaction_id`, if any.
    pub async fn session(&self, transaction_id: &str) -> Option<CheckoutSession> {
        self.sessions.read().await.get(transaction_id).cloned()
    }
}

#[async_trait]
impl PaymentGateway for SandboxGateway {
    async fn init_payment(
        &self,
        amount: Amount,
        transaction_id: &str,
        success_url: &str,
        fail_url: &str,
        cancel_url: &str,
    ) -> Result<String> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(TicketingError::Gateway(
                "sandbox gateway unavailable".to_string(),
            ));
        }

        let session = CheckoutSession {
            amount,
            validation_id: format!("VAL-{}", Uuid::new_v4().simple()),
            success_url: success_url.to_string(),
            fail_url: fail_url.to_string(),
            cancel_url: cancel_url.to_string(),
        };
        self.sessions
            .write()
            .await
            .insert(transaction_id.to_string(), session);

        tracing::info!(
            transaction_id,
            amount = %amount,
            "Sandbox checkout session opened"
        );

        Ok(format!(
            "{}/checkout?tran_id={}",
            self.base_url, transaction_id
        ))
    }

    async fn validate_payment(
        &self,
        validation_id: &str,
        transaction_id: &str,
        amount: Amount,
    ) -> Result<bool> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(transaction_id).is_some_and(|session| {
            session.validation_id == validation_id && session.amount == amount
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_sandbox_session_roundtrip() {
        let gateway = SandboxGateway::new("https://pay.test/");
        let amount = Amount::new(dec!(50)).unwrap();

        let url = gateway
            .init_payment(amount, "TICKET-1", "s", "f", "c")
            .await
            .unwrap();
        assert_eq!(url, "https://pay.test/checkout?tran_id=TICKET-1");

        let session = gateway.session("TICKET-1").await.unwrap();
        assert!(
            gateway
                .validate_payment(&session.validation_id, "TICKET-1", amount)
                .await
                .unwrap()
        );
        assert!(
            !gateway
                .validate_payment(&session.validation_id, "TICKET-1", Amount::new(dec!(49)).unwrap())
                .await
                .unwrap()
        );
        assert!(
            !gateway
                .validate_payment("VAL-forged", "TICKET-1", amount)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_sandbox_unavailable() {
        let gateway = SandboxGateway::new("https://pay.test");
        gateway.set_unavailable(true);
        let result = gateway
            .init_payment(Amount::new(dec!(5)).unwrap(), "T", "s", "f", "c")
            .await;
        assert!(matches!(result, Err(TicketingError::Gateway(_))));
    }
}

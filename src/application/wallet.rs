use crate::config::ServiceConfig;
use crate::domain::identity::{Passenger, UserId};
use crate::domain::money::{Amount, Balance};
use crate::domain::ports::{PaymentGatewayRef, WalletLedgerRef};
use crate::domain::ticket::PaymentMethod;
use crate::domain::wallet::{CreditKind, LedgerEntry, Transaction};
use crate::error::{Result, TicketingError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const RECHARGE_PREFIX: &str = "RECHARGE-";

#[derive(Debug, Clone, Deserialize)]
pub struct RechargeRequest {
    pub amount: Amount,
}

/// A gateway session opened for a wallet top-up.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RechargeSession {
    pub transaction_id: String,
    pub url: String,
}

/// Wallet balance, history and gateway-funded top-ups.
pub struct WalletService {
    ledger: WalletLedgerRef,
    gateway: PaymentGatewayRef,
    config: ServiceConfig,
}

impl WalletService {
    pub fn new(ledger: WalletLedgerRef, gateway: PaymentGatewayRef, config: ServiceConfig) -> Self {
        Self {
            ledger,
            gateway,
            config,
        }
    }

    pub async fn balance(&self, passenger: Passenger) -> Result<Balance> {
        self.ledger.balance(passenger.user_id).await
    }

    pub async fn transactions(&self, passenger: Passenger) -> Result<Vec<Transaction>> {
        self.ledger.transactions(passenger.user_id).await
    }

    pub async fn init_recharge(
        &self,
        passenger: Passenger,
        request: RechargeRequest,
    ) -> Result<RechargeSession> {
        let transaction_id = format!(
            "{RECHARGE_PREFIX}{}-{}",
            passenger.user_id,
            Uuid::new_v4().simple()
        );
        let callback = |outcome: &str| {
            self.config
                .callback_url(&format!("/wallet/recharge/{outcome}"))
        };
        let url = self
            .gateway
            .init_payment(
                request.amount,
                &transaction_id,
                &callback("success"),
                &callback("fail"),
                &callback("cancel"),
            )
            .await?;

        tracing::info!(
            user_id = %passenger.user_id,
            %transaction_id,
            amount = %request.amount,
            "Wallet recharge initialised"
        );
        Ok(RechargeSession {
            transaction_id,
            url,
        })
    }

    /// Credits a validated top-up. Safe to call again for the same
    /// transaction: the original credit is returned.
    pub async fn complete_recharge(
        &self,
        transaction_id: &str,
        validation_id: &str,
        amount: Amount,
    ) -> Result<Transaction> {
        let user_id = recharge_owner(transaction_id)?;
        if let Some(existing) = self.ledger.find_by_reference(transaction_id).await? {
            tracing::info!(transaction_id, "Recharge already credited");
            return Ok(existing);
        }

        if !self
            .gateway
            .validate_payment(validation_id, transaction_id, amount)
            .await?
        {
            tracing::warn!(transaction_id, "Recharge validation rejected");
            return Err(TicketingError::Conflict(
                "recharge could not be validated".to_string(),
            ));
        }

        let tx = self
            .ledger
            .credit(
                user_id,
                amount,
                CreditKind::Credit,
                LedgerEntry::new(transaction_id, "Wallet recharge", PaymentMethod::Gateway),
            )
            .await?;
        tracing::info!(%user_id, transaction_id, amount = %amount, "Wallet recharged");
        Ok(tx)
    }

    /// Fail and cancel callbacks for a top-up. Nothing was credited, so
    /// there is nothing to undo.
    pub async fn abandon_recharge(&self, transaction_id: &str, reason: &str) -> Result<()> {
        let user_id = recharge_owner(transaction_id)?;
        tracing::info!(%user_id, transaction_id, reason, "Wallet recharge not completed");
        Ok(())
    }
}

/// Owner encoded in a `RECHARGE-<user>-<nonce>` transaction id.
fn recharge_owner(transaction_id: &str) -> Result<UserId> {
    transaction_id
        .strip_prefix(RECHARGE_PREFIX)
        .and_then(|rest| rest.split_once('-'))
        .and_then(|(user, _)| user.parse().ok())
        .map(UserId)
        .ok_or_else(|| {
            TicketingError::Validation(format!("not a recharge transaction: {transaction_id}"))
        })
}

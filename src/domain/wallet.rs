use super::identity::UserId;
use super::money::{Amount, Balance};
use super::ticket::PaymentMethod;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Credit,
    Debit,
    Purchase,
    Refund,
}

/// Kinds of ledger entry that increase a balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditKind {
    Credit,
    Refund,
}

impl From<CreditKind> for TransactionType {
    fn from(kind: CreditKind) -> Self {
        match kind {
            CreditKind::Credit => TransactionType::Credit,
            CreditKind::Refund => TransactionType::Refund,
        }
    }
}

/// A user's prepaid wallet. Only the `WalletLedger` mutates it.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct WalletAccount {
    pub user_id: UserId,
    pub balance: Balance,
}

impl WalletAccount {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            balance: Balance::ZERO,
        }
    }

    /// Takes `amount` from the balance if it is covered.
    pub fn debit(&mut self, amount: Amount) -> Result<(), crate::error::TicketingError> {
        if self.balance.covers(amount) {
            self.balance -= amount.into();
            Ok(())
        } else {
            Err(crate::error::TicketingError::InsufficientFunds)
        }
    }

    pub fn credit(&mut self, amount: Amount) {
        self.balance += amount.into();
    }
}

/// Append-only audit entry; exactly one per balance mutation.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Transaction {
    pub id: i64,
    pub user_id: UserId,
    pub amount: Amount,
    pub r#type: TransactionType,
    pub description: String,
    pub payment_method: PaymentMethod,
    /// Idempotency key: repeating the same mutation under this reference is
    /// a no-op; see [`Transaction::replay`].
    pub reference: String,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Hands back this transaction to a retry of the same mutation. Reusing
    /// the reference for another user, type or amount is a conflict.
    pub fn replay(
        self,
        user_id: UserId,
        amount: Amount,
        r#type: TransactionType,
    ) -> Result<Transaction, crate::error::TicketingError> {
        if self.user_id == user_id && self.amount == amount && self.r#type == r#type {
            Ok(self)
        } else {
            Err(crate::error::TicketingError::Conflict(format!(
                "reference {} already used",
                self.reference
            )))
        }
    }
}

/// What a caller asks the ledger to record alongside a mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub reference: String,
    pub description: String,
    pub payment_method: PaymentMethod,
}

impl LedgerEntry {
    pub fn new(
        reference: impl Into<String>,
        description: impl Into<String>,
        payment_method: PaymentMethod,
    ) -> Self {
        Self {
            reference: reference.into(),
            description: description.into(),
            payment_method,
        }
    }

    pub(crate) fn into_transaction(
        self,
        id: i64,
        user_id: UserId,
        amount: Amount,
        r#type: TransactionType,
    ) -> Transaction {
        Transaction {
            id,
            user_id,
            amount,
            r#type,
            description: self.description,
            payment_method: self.payment_method,
            reference: self.reference,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TicketingError;
    use rust_decimal_macros::dec;

    #[test]
    fn test_wallet_debit_success() {
        let mut wallet = WalletAccount::new(UserId(1));
        wallet.credit(Amount::new(dec!(100)).unwrap());

        wallet.debit(Amount::new(dec!(80)).unwrap()).unwrap();
        assert_eq!(wallet.balance, Balance::new(dec!(20)));
    }

    #[test]
    fn test_wallet_debit_insufficient() {
        let mut wallet = WalletAccount::new(UserId(1));
        wallet.credit(Amount::new(dec!(10)).unwrap());

        let result = wallet.debit(Amount::new(dec!(20)).unwrap());
        assert!(matches!(result, Err(TicketingError::InsufficientFunds)));
        assert_eq!(wallet.balance, Balance::new(dec!(10)));
    }

    #[test]
    fn test_replay_requires_the_same_mutation() {
        let amount = Amount::new(dec!(100)).unwrap();
        let tx = LedgerEntry::new("seed:1:100", "top up", PaymentMethod::Gateway).into_transaction(
            1,
            UserId(1),
            amount,
            TransactionType::Credit,
        );

        assert_eq!(
            tx.clone().replay(UserId(1), amount, TransactionType::Credit).unwrap(),
            tx
        );
        assert!(matches!(
            tx.clone().replay(UserId(1), amount, TransactionType::Purchase),
            Err(TicketingError::Conflict(_))
        ));
        assert!(matches!(
            tx.clone().replay(UserId(2), amount, TransactionType::Credit),
            Err(TicketingError::Conflict(_))
        ));
        assert!(matches!(
            tx.replay(UserId(1), Amount::new(dec!(80)).unwrap(), TransactionType::Credit),
            Err(TicketingError::Conflict(_))
        ));
    }

    #[test]
    fn test_transaction_type_serialization() {
        let json = serde_json::to_string(&TransactionType::Purchase).unwrap();
        assert_eq!(json, "\"purchase\"");
        assert_eq!(
            TransactionType::from(CreditKind::Refund),
            TransactionType::Refund
        );
    }
}

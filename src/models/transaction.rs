// models/transaction.rs
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Initiated,
    Completed,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Initiated => "initiated",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Initiated)
    }
}

impl TryFrom<String> for TransactionStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "initiated" => Ok(TransactionStatus::Initiated),
            "completed" => Ok(TransactionStatus::Completed),
            "failed" => Ok(TransactionStatus::Failed),
            other => Err(format!("unknown transaction status '{}'", other)),
        }
    }
}

/// One payment attempt, keyed by the provider's correlation id.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Transaction {
    pub id: Uuid,
    pub checkout_request_id: String,
    pub merchant_request_id: Option<String>,
    pub phone_number: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    #[sqlx(try_from = "String")]
    pub status: TransactionStatus,
    pub mpesa_receipt: Option<String>,
    pub transaction_date: Option<DateTime<Utc>>,
    pub result_code: Option<i32>,
    pub result_desc: Option<String>,
    pub user_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub checkout_request_id: String,
    pub merchant_request_id: Option<String>,
    pub phone_number: String,
    pub amount: Decimal,
    pub user_id: Option<Uuid>,
}

/// Settlement details reported by the provider on a successful payment.
#[derive(Debug, Clone, PartialEq)]
pub struct Settlement {
    pub receipt: String,
    pub amount: Option<Decimal>,
    pub phone_number: Option<String>,
    pub transaction_date: DateTime<Utc>,
    pub result_code: i32,
    pub result_desc: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Failure {
    pub result_code: i32,
    pub result_desc: String,
}

/// The single terminal write applied to an `initiated` transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum TerminalUpdate {
    Completed(Settlement),
    Failed(Failure),
}

impl TerminalUpdate {
    pub fn status(&self) -> TransactionStatus {
        match self {
            TerminalUpdate::Completed(_) => TransactionStatus::Completed,
            TerminalUpdate::Failed(_) => TransactionStatus::Failed,
        }
    }
}

impl Transaction {
    pub fn from_new(new: NewTransaction, now: DateTime<Utc>) -> Self {
        Transaction {
            id: Uuid::new_v4(),
            checkout_request_id: new.checkout_request_id,
            merchant_request_id: new.merchant_request_id,
            phone_number: new.phone_number,
            amount: new.amount,
            status: TransactionStatus::Initiated,
            mpesa_receipt: None,
            transaction_date: None,
            result_code: None,
            result_desc: None,
            user_id: new.user_id,
            created_at: now,
            updated_at: now,
        }
    }

    /// Applies a terminal update in memory; callers must already hold the CAS guard.
    pub fn apply(&mut self, update: &TerminalUpdate, now: DateTime<Utc>) {
        match update {
            TerminalUpdate::Completed(settlement) => {
                self.status = TransactionStatus::Completed;
                self.mpesa_receipt = Some(settlement.receipt.clone());
                if let Some(amount) = settlement.amount {
                    self.amount = amount;
                }
                if let Some(phone) = &settlement.phone_number {
                    self.phone_number = phone.clone();
                }
                self.transaction_date = Some(settlement.transaction_date);
                self.result_code = Some(settlement.result_code);
                self.result_desc = Some(settlement.result_desc.clone());
            }
            TerminalUpdate::Failed(failure) => {
                self.status = TransactionStatus::Failed;
                self.result_code = Some(failure.result_code);
                self.result_desc = Some(failure.result_desc.clone());
            }
        }
        self.updated_at = now;
    }
}

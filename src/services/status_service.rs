// services/status_service.rs
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::database::TransactionStore;
use crate::errors::Result;
use crate::models::transaction::{Transaction, TransactionStatus};

/// Polling view of a payment. A missing row is the normal pre-callback state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatus {
    pub status: &'static str,
    pub transaction_id: Option<Uuid>,
    pub mpesa_receipt: Option<String>,
    #[serde(with = "rust_decimal::serde::float_option")]
    pub amount: Option<Decimal>,
    pub transaction_date: Option<DateTime<Utc>>,
    pub result_code: Option<i32>,
    pub result_desc: Option<String>,
    pub user_id: Option<Uuid>,
    pub message: String,
}

impl PaymentStatus {
    pub fn pending() -> Self {
        PaymentStatus {
            status: "pending",
            transaction_id: None,
            mpesa_receipt: None,
            amount: None,
            transaction_date: None,
            result_code: None,
            result_desc: None,
            user_id: None,
            message: "Waiting for payment confirmation...".to_string(),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == "pending"
    }
}

impl From<Transaction> for PaymentStatus {
    fn from(tx: Transaction) -> Self {
        let (status, message) = match tx.status {
            TransactionStatus::Initiated => ("pending", "Waiting for payment confirmation...".to_string()),
            TransactionStatus::Completed => ("completed", "Payment completed successfully".to_string()),
            TransactionStatus::Failed => (
                "failed",
                tx.result_desc.clone().unwrap_or_else(|| "Payment failed".to_string()),
            ),
        };

        PaymentStatus {
            status,
            transaction_id: Some(tx.id),
            mpesa_receipt: tx.mpesa_receipt,
            amount: Some(tx.amount),
            transaction_date: tx.transaction_date,
            result_code: tx.result_code,
            result_desc: tx.result_desc,
            user_id: tx.user_id,
            message,
        }
    }
}

pub async fn get_status(store: &dyn TransactionStore, correlation_id: &str) -> Result<PaymentStatus> {
    Ok(store
        .find_by_checkout_request_id(correlation_id)
        .await?
        .map(PaymentStatus::from)
        .unwrap_or_else(PaymentStatus::pending))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::MemoryStore;
    use crate::models::transaction::NewTransaction;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn unknown_correlation_id_is_pending() {
        let store = MemoryStore::new();
        let status = get_status(&store, "ws_missing").await.unwrap();
        assert!(status.is_pending());
        assert_eq!(status.transaction_id, None);
    }

    #[tokio::test]
    async fn initiated_rows_are_reported_as_pending() {
        let store = MemoryStore::new();
        let tx = store
            .insert_initiated(NewTransaction {
                checkout_request_id: "ws_010".into(),
                merchant_request_id: None,
                phone_number: "254712345678".into(),
                amount: dec!(100),
                user_id: None,
            })
            .await
            .unwrap()
            .unwrap();

        let status = get_status(&store, "ws_010").await.unwrap();
        assert_eq!(status.status, "pending");
        assert_eq!(status.transaction_id, Some(tx.id));
        assert_eq!(status.amount, Some(dec!(100)));
    }
}

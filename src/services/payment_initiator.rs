// services/payment_initiator.rs
use rust_decimal::Decimal;
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::payment_provider::{PaymentProvider, PaymentRequest, ProviderAcceptance};
use crate::config::CheckoutSettings;
use crate::database::TransactionStore;
use crate::errors::{AppError, Result};
use crate::models::transaction::NewTransaction;
use crate::utils::amount::parse_payment_amount;
use crate::utils::phone::normalize_phone;

#[derive(Debug, Clone)]
pub struct InitiationResult {
    pub acceptance: ProviderAcceptance,
    pub provider: &'static str,
    pub phone_number: String,
    pub amount: i64,
    /// False when the `initiated` row could not be written after the provider accepted.
    pub recorded: bool,
}

/// Requests a phone prompt and records the attempt under the provider's correlation id.
pub struct PaymentInitiator {
    transactions: Arc<dyn TransactionStore>,
    provider: Arc<dyn PaymentProvider>,
    settings: CheckoutSettings,
}

impl PaymentInitiator {
    pub fn new(
        transactions: Arc<dyn TransactionStore>,
        provider: Arc<dyn PaymentProvider>,
        settings: CheckoutSettings,
    ) -> Self {
        PaymentInitiator {
            transactions,
            provider,
            settings,
        }
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    pub async fn initiate(
        &self,
        phone_number: &str,
        amount: &Value,
        account_reference: Option<&str>,
        caller: Option<Uuid>,
    ) -> Result<InitiationResult> {
        let phone_number = normalize_phone(phone_number)
            .ok_or_else(|| AppError::invalid_data("Phone number must contain digits"))?;
        let amount = parse_payment_amount(amount)?;

        let request = PaymentRequest {
            phone_number: phone_number.clone(),
            amount,
            account_reference: account_reference
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .unwrap_or(&self.settings.default_account_reference)
                .to_string(),
            description: self.settings.transaction_desc.clone(),
        };

        let acceptance = self.provider.request_payment(&request).await.map_err(|e| {
            error!(provider = self.provider.name(), error = %e, "❌ Payment initiation failed");
            AppError::from(e)
        })?;

        let new_tx = NewTransaction {
            checkout_request_id: acceptance.checkout_request_id.clone(),
            merchant_request_id: acceptance.merchant_request_id.clone(),
            phone_number: phone_number.clone(),
            amount: Decimal::from(amount),
            user_id: caller,
        };

        // The prompt is already on the customer's phone, so a store failure is not surfaced.
        let recorded = match self.transactions.insert_initiated(new_tx).await {
            Ok(Some(tx)) => {
                info!(
                    transaction_id = %tx.id,
                    checkout_request_id = %tx.checkout_request_id,
                    user_id = ?tx.user_id,
                    "💾 Transaction recorded as initiated"
                );
                true
            }
            Ok(None) => {
                warn!(
                    checkout_request_id = %acceptance.checkout_request_id,
                    "Correlation id already recorded, keeping existing row"
                );
                true
            }
            Err(e) => {
                error!(
                    checkout_request_id = %acceptance.checkout_request_id,
                    phone = %phone_number,
                    amount,
                    error = %e,
                    "❌ Failed to record initiated transaction after provider accepted"
                );
                false
            }
        };

        Ok(InitiationResult {
            acceptance,
            provider: self.provider.name(),
            phone_number,
            amount,
            recorded,
        })
    }
}

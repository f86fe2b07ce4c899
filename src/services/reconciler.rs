// services/reconciler.rs
use chrono::{FixedOffset, Utc};
use serde_json::Value;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::callback::{classify, CallbackPayload, ClassifiedCallback, Correlation, PayloadError};
use super::notifier::{Notification, NotificationDispatcher, ReceiptDetails};
use crate::database::Stores;
use crate::errors::StoreError;
use crate::models::transaction::{TerminalUpdate, Transaction, TransactionStatus};
use crate::models::user::User;
use crate::utils::phone::phone_candidates;

/// Which lookup located the transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStep {
    CheckoutRequestId,
    MerchantRequestId,
    PhoneNumber,
}

impl MatchStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStep::CheckoutRequestId => "checkout_request_id",
            MatchStep::MerchantRequestId => "merchant_request_id",
            MatchStep::PhoneNumber => "phone_number",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    Completed {
        transaction_id: Uuid,
        matched_by: MatchStep,
        user_id: Option<Uuid>,
    },
    Failed {
        transaction_id: Uuid,
        matched_by: MatchStep,
    },
    /// Replay of a callback for a transaction that is already terminal.
    AlreadyTerminal {
        transaction_id: Uuid,
        status: TransactionStatus,
    },
    Orphaned,
    Malformed(String),
    StoreFailure(String),
}

/// Matches provider callbacks to transactions and applies the single terminal transition.
///
/// Never returns an error: every failure mode is logged and folded into a
/// [`ReconcileOutcome`], since the provider only understands success acks.
#[derive(Clone)]
pub struct CallbackReconciler {
    stores: Stores,
    dispatcher: NotificationDispatcher,
    merchant_offset: FixedOffset,
}

impl CallbackReconciler {
    pub fn new(stores: Stores, dispatcher: NotificationDispatcher, merchant_offset: FixedOffset) -> Self {
        CallbackReconciler {
            stores,
            dispatcher,
            merchant_offset,
        }
    }

    pub async fn reconcile(&self, body: &Value) -> ReconcileOutcome {
        let classified = match CallbackPayload::from_value(body)
            .and_then(|payload| classify(&payload, &self.merchant_offset, Utc::now()))
        {
            Ok(classified) => classified,
            Err(e) => {
                if e == PayloadError::Unrecognised {
                    warn!(payload = %body, "Unrecognised callback payload, acknowledging");
                } else {
                    error!(error = %e, payload = %body, "❌ Malformed callback, acknowledging without transition");
                }
                return ReconcileOutcome::Malformed(e.to_string());
            }
        };

        info!(
            shape = classified.shape.as_str(),
            correlation_id = %classified.correlation.primary,
            secondary_id = ?classified.correlation.secondary,
            status = classified.update.status().as_str(),
            "📨 Callback received"
        );

        let (candidate, matched_by) = match self.find_candidate(&classified.correlation).await {
            Ok(Some(found)) => found,
            Ok(None) => {
                warn!(
                    correlation_id = %classified.correlation.primary,
                    secondary_id = ?classified.correlation.secondary,
                    phone = ?classified.correlation.phone_number,
                    result_code = result_code_of(&classified),
                    "🚨 Orphaned callback: no transaction matches, manual reconciliation required"
                );
                return ReconcileOutcome::Orphaned;
            }
            Err((step, e)) => {
                error!(
                    correlation_id = %classified.correlation.primary,
                    match_step = step.as_str(),
                    error = %e,
                    "❌ Store error while matching callback"
                );
                return ReconcileOutcome::StoreFailure(e.to_string());
            }
        };

        self.transition(candidate, matched_by, &classified).await
    }

    /// Lookup cascade: primary id, then latest by secondary id, then latest initiated by phone.
    async fn find_candidate(
        &self,
        correlation: &Correlation,
    ) -> Result<Option<(Transaction, MatchStep)>, (MatchStep, StoreError)> {
        let store = &self.stores.transactions;

        let step = MatchStep::CheckoutRequestId;
        if let Some(tx) = store
            .find_by_checkout_request_id(&correlation.primary)
            .await
            .map_err(|e| (step, e))?
        {
            return Ok(Some((tx, step)));
        }

        if let Some(secondary) = &correlation.secondary {
            let step = MatchStep::MerchantRequestId;
            if let Some(tx) = store
                .find_latest_by_merchant_request_id(secondary)
                .await
                .map_err(|e| (step, e))?
            {
                return Ok(Some((tx, step)));
            }
        }

        if let Some(phone) = &correlation.phone_number {
            let step = MatchStep::PhoneNumber;
            if let Some(tx) = store
                .find_latest_initiated_by_phone(phone)
                .await
                .map_err(|e| (step, e))?
            {
                // Two concurrent prompts from one phone would be indistinguishable here.
                warn!(
                    transaction_id = %tx.id,
                    correlation_id = %correlation.primary,
                    stored_checkout_request_id = %tx.checkout_request_id,
                    phone = %phone,
                    "⚠️ Callback matched by phone number only"
                );
                return Ok(Some((tx, step)));
            }
        }

        Ok(None)
    }

    async fn transition(
        &self,
        candidate: Transaction,
        matched_by: MatchStep,
        classified: &ClassifiedCallback,
    ) -> ReconcileOutcome {
        let store = &self.stores.transactions;

        let updated = match store.transition_if_initiated(candidate.id, &classified.update).await {
            Ok(updated) => updated,
            Err(e) => {
                error!(
                    transaction_id = %candidate.id,
                    match_step = matched_by.as_str(),
                    error = %e,
                    "❌ Failed to apply callback transition"
                );
                return ReconcileOutcome::StoreFailure(e.to_string());
            }
        };

        let Some(tx) = updated else {
            return match store.find_by_id(candidate.id).await {
                Ok(Some(current)) if current.status.is_terminal() => {
                    info!(
                        transaction_id = %current.id,
                        status = current.status.as_str(),
                        "🔁 Duplicate callback for settled transaction, nothing to do"
                    );
                    ReconcileOutcome::AlreadyTerminal {
                        transaction_id: current.id,
                        status: current.status,
                    }
                }
                Ok(Some(current)) => {
                    error!(transaction_id = %current.id, "❌ Transition skipped but row is still initiated");
                    ReconcileOutcome::StoreFailure("transition affected no rows".to_string())
                }
                Ok(None) => {
                    warn!(transaction_id = %candidate.id, "Matched transaction disappeared before transition");
                    ReconcileOutcome::Orphaned
                }
                Err(e) => {
                    error!(transaction_id = %candidate.id, error = %e, "❌ Failed to re-read transaction");
                    ReconcileOutcome::StoreFailure(e.to_string())
                }
            };
        };

        match tx.status {
            TransactionStatus::Completed => {
                info!(
                    transaction_id = %tx.id,
                    receipt = ?tx.mpesa_receipt,
                    amount = %tx.amount,
                    match_step = matched_by.as_str(),
                    "✅ Payment completed"
                );
                let user_id = self.after_completion(&tx).await;
                ReconcileOutcome::Completed {
                    transaction_id: tx.id,
                    matched_by,
                    user_id,
                }
            }
            _ => {
                info!(
                    transaction_id = %tx.id,
                    result_code = ?tx.result_code,
                    result_desc = ?tx.result_desc,
                    match_step = matched_by.as_str(),
                    "Payment failed"
                );
                ReconcileOutcome::Failed {
                    transaction_id: tx.id,
                    matched_by,
                }
            }
        }
    }

    /// Links the owner, notifies and clears the cart. Every failure is logged only.
    async fn after_completion(&self, tx: &Transaction) -> Option<Uuid> {
        let Some(user) = self.resolve_user(tx).await else {
            warn!(
                transaction_id = %tx.id,
                phone = %tx.phone_number,
                "Completed payment has no resolvable user, left unlinked"
            );
            return None;
        };

        if tx.user_id.is_none() {
            match self.stores.transactions.attach_user(tx.id, user.id).await {
                Ok(()) => info!(transaction_id = %tx.id, user_id = %user.id, "🔗 Transaction linked to user"),
                Err(e) => error!(transaction_id = %tx.id, user_id = %user.id, error = %e, "Failed to link user"),
            }
        }

        let items = match self.stores.carts.cart_snapshot(user.id).await {
            Ok(items) => items,
            Err(e) => {
                error!(user_id = %user.id, error = %e, "Failed to read cart for receipt");
                Vec::new()
            }
        };

        let details = ReceiptDetails {
            customer_name: user.full_name.clone(),
            customer_email: user.email.clone(),
            receipt: tx.mpesa_receipt.clone().unwrap_or_default(),
            amount: tx.amount,
            phone_number: tx.phone_number.clone(),
            items,
        };

        self.dispatcher.dispatch(Notification::CustomerReceipt {
            user: user.clone(),
            details: details.clone(),
        });
        self.dispatcher.dispatch(Notification::AdminAlert(details));

        match self.stores.carts.clear_cart(user.id).await {
            Ok(removed) => info!(user_id = %user.id, removed, "🛒 Cart cleared"),
            Err(e) => error!(user_id = %user.id, error = %e, "Failed to clear cart"),
        }

        Some(user.id)
    }

    async fn resolve_user(&self, tx: &Transaction) -> Option<User> {
        let users = &self.stores.users;

        if let Some(user_id) = tx.user_id {
            match users.find_user_by_id(user_id).await {
                Ok(Some(user)) => return Some(user),
                Ok(None) => warn!(transaction_id = %tx.id, user_id = %user_id, "Transaction user not found"),
                Err(e) => error!(transaction_id = %tx.id, error = %e, "User lookup by id failed"),
            }
        }

        for candidate in phone_candidates(&tx.phone_number) {
            match users.find_user_by_phone(&candidate).await {
                Ok(Some(user)) => return Some(user),
                Ok(None) => {}
                Err(e) => {
                    error!(transaction_id = %tx.id, phone = %candidate, error = %e, "User lookup by phone failed");
                }
            }
        }

        None
    }
}

fn result_code_of(classified: &ClassifiedCallback) -> i32 {
    match &classified.update {
        TerminalUpdate::Completed(s) => s.result_code,
        TerminalUpdate::Failed(f) => f.result_code,
    }
}

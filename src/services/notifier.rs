// services/notifier.rs
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use crate::config::RetryPolicy;
use crate::models::user::{CartLine, User};

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("notifier not configured: {0}")]
    NotConfigured(String),

    #[error("missing recipient")]
    MissingRecipient,

    #[error("transport error: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for NotifyError {
    fn from(err: reqwest::Error) -> Self {
        NotifyError::Transport(err.to_string())
    }
}

/// Payment receipt details shared by the customer and admin messages.
#[derive(Debug, Clone, Serialize)]
pub struct ReceiptDetails {
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub receipt: String,
    pub amount: Decimal,
    pub phone_number: String,
    pub items: Vec<CartLine>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderLine {
    pub name: String,
    pub quantity: i32,
    pub price: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderDetails {
    pub customer_name: Option<String>,
    pub order_number: String,
    pub amount: Decimal,
    pub items: Vec<OrderLine>,
}

/// Outbound transactional messages.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_customer_receipt(&self, user: &User, details: &ReceiptDetails) -> Result<(), NotifyError>;

    async fn send_admin_alert(&self, details: &ReceiptDetails) -> Result<(), NotifyError>;

    async fn send_order_confirmation(&self, user: &User, details: &OrderDetails) -> Result<(), NotifyError>;
}

#[derive(Debug, Clone)]
pub enum Notification {
    CustomerReceipt { user: User, details: ReceiptDetails },
    AdminAlert(ReceiptDetails),
    OrderConfirmation { user: User, details: OrderDetails },
}

impl Notification {
    fn kind(&self) -> &'static str {
        match self {
            Notification::CustomerReceipt { .. } => "customer_receipt",
            Notification::AdminAlert(_) => "admin_alert",
            Notification::OrderConfirmation { .. } => "order_confirmation",
        }
    }
}

/// Fire-and-forget delivery with bounded retries.
///
/// Each notification runs on its own tracked task, so the payment path never
/// waits on the mail transport. `drain` waits for in-flight deliveries.
#[derive(Clone)]
pub struct NotificationDispatcher {
    notifier: Arc<dyn Notifier>,
    policy: RetryPolicy,
    tracker: TaskTracker,
}

impl NotificationDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>, policy: RetryPolicy) -> Self {
        NotificationDispatcher {
            notifier,
            policy,
            tracker: TaskTracker::new(),
        }
    }

    pub fn dispatch(&self, notification: Notification) {
        let notifier = self.notifier.clone();
        let policy = self.policy;
        self.tracker.spawn(async move {
            deliver(notifier.as_ref(), policy, notification).await;
        });
    }

    /// Waits until every dispatched notification has finished or given up.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }
}

async fn deliver(notifier: &dyn Notifier, policy: RetryPolicy, notification: Notification) {
    let kind = notification.kind();
    let max_attempts = policy.max_attempts.max(1);

    for attempt in 1..=max_attempts {
        let result = match &notification {
            Notification::CustomerReceipt { user, details } => notifier.send_customer_receipt(user, details).await,
            Notification::AdminAlert(details) => notifier.send_admin_alert(details).await,
            Notification::OrderConfirmation { user, details } => {
                notifier.send_order_confirmation(user, details).await
            }
        };

        match result {
            Ok(()) => {
                info!(kind, attempt, "📧 Notification sent");
                return;
            }
            // Retrying cannot fix a missing key or recipient.
            Err(e @ (NotifyError::NotConfigured(_) | NotifyError::MissingRecipient)) => {
                warn!(kind, error = %e, "Notification skipped");
                return;
            }
            Err(e) if attempt < max_attempts => {
                let delay = policy.base_delay * 2u32.saturating_pow(attempt - 1);
                warn!(kind, attempt, error = %e, retry_in_ms = delay.as_millis() as u64, "Notification failed, retrying");
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                error!(kind, attempt, error = %e, "❌ Notification failed, giving up");
            }
        }
    }
}

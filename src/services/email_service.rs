// services/email_service.rs
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use super::notifier::{Notifier, NotifyError, OrderDetails, ReceiptDetails};
use crate::config::EmailConfig;
use crate::models::user::User;

const RESEND_URL: &str = "https://api.resend.com/emails";

/// Transactional mail over the Resend HTTP API.
#[derive(Clone)]
pub struct EmailService {
    api_key: Option<String>,
    from: String,
    admin_email: String,
    client: Client,
}

impl EmailService {
    pub fn new(config: &EmailConfig) -> Self {
        Self {
            api_key: config.resend_api_key.clone(),
            from: config.from_email.clone(),
            admin_email: config.admin_email.clone(),
            client: Client::new(),
        }
    }

    async fn send(&self, to: &str, subject: &str, text: String) -> Result<(), NotifyError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| NotifyError::NotConfigured("RESEND_API_KEY is not set".to_string()))?;

        let response = self
            .client
            .post(RESEND_URL)
            .bearer_auth(api_key)
            .json(&json!({
                "from": self.from,
                "to": [to],
                "subject": subject,
                "text": text,
            }))
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(NotifyError::Transport(format!(
                "email sending failed with status: {}",
                response.status()
            )))
        }
    }
}

fn receipt_body(details: &ReceiptDetails) -> String {
    let mut body = format!(
        "Hello {},\n\nWe have received your payment.\n\nReceipt: {}\nAmount: KES {}\nPhone: {}\n",
        details.customer_name.as_deref().unwrap_or("Customer"),
        details.receipt,
        details.amount,
        details.phone_number,
    );
    if !details.items.is_empty() {
        body.push_str("\nItems:\n");
        for item in &details.items {
            body.push_str(&format!("- {} x{} @ KES {}\n", item.name, item.quantity, item.price));
        }
    }
    body
}

#[async_trait]
impl Notifier for EmailService {
    async fn send_customer_receipt(&self, user: &User, details: &ReceiptDetails) -> Result<(), NotifyError> {
        let to = user.email.as_deref().ok_or(NotifyError::MissingRecipient)?;
        let subject = format!("Order Confirmation - {}", details.receipt);
        self.send(to, &subject, receipt_body(details)).await
    }

    async fn send_admin_alert(&self, details: &ReceiptDetails) -> Result<(), NotifyError> {
        let subject = format!("New Order #{} - KES {}", details.receipt, details.amount);
        let mut body = receipt_body(details);
        if let Some(email) = &details.customer_email {
            body.push_str(&format!("\nCustomer email: {}\n", email));
        }
        self.send(&self.admin_email, &subject, body).await
    }

    async fn send_order_confirmation(&self, user: &User, details: &OrderDetails) -> Result<(), NotifyError> {
        let to = user.email.as_deref().ok_or(NotifyError::MissingRecipient)?;
        let subject = format!("Order Confirmation #{}", details.order_number);

        let mut body = format!(
            "Hello {},\n\nYour order {} is confirmed.\nTotal: KES {}\n\nItems:\n",
            details.customer_name.as_deref().unwrap_or("Customer"),
            details.order_number,
            details.amount,
        );
        for line in &details.items {
            body.push_str(&format!("- {} x{} @ KES {}\n", line.name, line.quantity, line.price));
        }

        self.send(to, &subject, body).await
    }
}

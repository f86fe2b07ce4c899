#![allow(dead_code)]

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use checkout_api::config::{CheckoutSettings, RetryPolicy};
use checkout_api::database::memory::MemoryStore;
use checkout_api::database::{Stores, TransactionStore};
use checkout_api::models::transaction::{NewTransaction, Transaction};
use checkout_api::models::user::{CartLine, User};
use checkout_api::services::notifier::{NotificationDispatcher, Notifier, NotifyError, OrderDetails, ReceiptDetails};
use checkout_api::services::payment_provider::{PaymentProvider, PaymentRequest, ProviderAcceptance, ProviderError};
use checkout_api::state::AppState;

pub const JWT_SECRET: &str = "test-secret";

/// Records every send; optionally fails them all.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<String>>,
    pub attempts: AtomicUsize,
    pub fail: AtomicBool,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    fn record(&self, entry: String) -> Result<(), NotifyError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(NotifyError::Transport("smtp down".into()));
        }
        self.sent.lock().unwrap().push(entry);
        Ok(())
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_customer_receipt(&self, user: &User, details: &ReceiptDetails) -> Result<(), NotifyError> {
        self.record(format!("receipt:{}:{}", user.id, details.receipt))
    }

    async fn send_admin_alert(&self, details: &ReceiptDetails) -> Result<(), NotifyError> {
        self.record(format!("admin:{}", details.receipt))
    }

    async fn send_order_confirmation(&self, user: &User, details: &OrderDetails) -> Result<(), NotifyError> {
        self.record(format!("order:{}:{}", user.id, details.order_number))
    }
}

/// Provider double that hands out `ws_001`, `ws_002`, ... or fails authentication.
#[derive(Default)]
pub struct ScriptedProvider {
    pub calls: AtomicUsize,
    pub fail_auth: AtomicBool,
    pub requests: Mutex<Vec<PaymentRequest>>,
}

#[async_trait]
impl PaymentProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn request_payment(&self, request: &PaymentRequest) -> Result<ProviderAcceptance, ProviderError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.requests.lock().unwrap().push(request.clone());

        if self.fail_auth.load(Ordering::SeqCst) {
            return Err(ProviderError::Auth("token endpoint returned 401".into()));
        }

        let checkout_request_id = format!("ws_{:03}", n);
        let merchant_request_id = format!("mr_{:03}", n);
        Ok(ProviderAcceptance {
            checkout_request_id: checkout_request_id.clone(),
            merchant_request_id: Some(merchant_request_id.clone()),
            response_code: "0".into(),
            response_description: Some("Success. Request accepted for processing".into()),
            raw: json!({
                "MerchantRequestID": merchant_request_id,
                "CheckoutRequestID": checkout_request_id,
                "ResponseCode": "0",
                "ResponseDescription": "Success. Request accepted for processing",
                "CustomerMessage": "Success. Request accepted for processing"
            }),
        })
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub provider: Arc<ScriptedProvider>,
    pub dispatcher: NotificationDispatcher,
    pub state: AppState,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(true)
    }

    pub fn without_provider() -> Self {
        Self::build(false)
    }

    fn build(with_provider: bool) -> Self {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let provider = Arc::new(ScriptedProvider::default());
        let dispatcher = NotificationDispatcher::new(
            notifier.clone(),
            RetryPolicy {
                max_attempts: 2,
                base_delay: Duration::from_millis(1),
            },
        );

        let settings = CheckoutSettings {
            jwt_secret: JWT_SECRET.to_string(),
            ..CheckoutSettings::default()
        };

        let mut state = AppState::new(Stores::from_shared(store.clone()), dispatcher.clone(), settings);
        if with_provider {
            state = state.with_payment_provider(provider.clone());
        }

        Harness {
            store,
            notifier,
            provider,
            dispatcher,
            state,
        }
    }

    pub async fn seed_user(&self, phone: &str) -> User {
        let user = User {
            id: Uuid::new_v4(),
            email: Some("wanjiru@example.com".into()),
            full_name: Some("Wanjiru Kamau".into()),
            phone_number: Some(phone.into()),
        };
        self.store.seed_user(user.clone()).await;
        self.store
            .seed_cart(
                user.id,
                vec![CartLine {
                    name: "Shea butter".into(),
                    quantity: 2,
                    price: Decimal::from(250),
                }],
            )
            .await;
        user
    }

    pub async fn seed_initiated(
        &self,
        checkout_request_id: &str,
        merchant_request_id: Option<&str>,
        phone: &str,
        user_id: Option<Uuid>,
    ) -> Transaction {
        self.store
            .insert_initiated(NewTransaction {
                checkout_request_id: checkout_request_id.into(),
                merchant_request_id: merchant_request_id.map(Into::into),
                phone_number: phone.into(),
                amount: Decimal::from(500),
                user_id,
            })
            .await
            .unwrap()
            .unwrap()
    }

    pub async fn transaction(&self, id: Uuid) -> Transaction {
        self.store.find_by_id(id).await.unwrap().unwrap()
    }
}

pub fn stk_success(checkout_request_id: &str, merchant_request_id: &str, receipt: &str, phone: u64) -> Value {
    json!({
        "Body": {
            "stkCallback": {
                "MerchantRequestID": merchant_request_id,
                "CheckoutRequestID": checkout_request_id,
                "ResultCode": 0,
                "ResultDesc": "The service request is processed successfully.",
                "CallbackMetadata": {
                    "Item": [
                        { "Name": "Amount", "Value": 500 },
                        { "Name": "MpesaReceiptNumber", "Value": receipt },
                        { "Name": "TransactionDate", "Value": 20250101120000u64 },
                        { "Name": "PhoneNumber", "Value": phone }
                    ]
                }
            }
        }
    })
}

pub fn stk_failure(checkout_request_id: &str, merchant_request_id: &str, code: i32, desc: &str) -> Value {
    json!({
        "Body": {
            "stkCallback": {
                "MerchantRequestID": merchant_request_id,
                "CheckoutRequestID": checkout_request_id,
                "ResultCode": code,
                "ResultDesc": desc
            }
        }
    })
}

use serde_json::Value;
use std::sync::Arc;

use crate::config::CheckoutSettings;
use crate::database::Stores;
use crate::services::notifier::NotificationDispatcher;
use crate::services::order_service::OrderMaterializer;
use crate::services::payment_initiator::PaymentInitiator;
use crate::services::payment_provider::PaymentProvider;
use crate::services::reconciler::CallbackReconciler;

#[derive(Clone)]
pub struct AppState {
    pub stores: Stores,
    pub settings: Arc<CheckoutSettings>,
    pub notifications: NotificationDispatcher,
    pub reconciler: Arc<CallbackReconciler>,
    pub orders: Arc<OrderMaterializer>,
    /// `None` when no provider is configured; payment requests then answer 503.
    pub initiator: Option<Arc<PaymentInitiator>>,
    pub config_info: Arc<Value>,
}

impl AppState {
    pub fn new(stores: Stores, notifications: NotificationDispatcher, settings: CheckoutSettings) -> Self {
        let reconciler = CallbackReconciler::new(stores.clone(), notifications.clone(), settings.merchant_offset);
        let orders = OrderMaterializer::new(
            stores.clone(),
            notifications.clone(),
            settings.order_number_prefix.clone(),
        );

        AppState {
            stores,
            settings: Arc::new(settings),
            notifications,
            reconciler: Arc::new(reconciler),
            orders: Arc::new(orders),
            initiator: None,
            config_info: Arc::new(Value::Null),
        }
    }

    pub fn with_payment_provider(mut self, provider: Arc<dyn PaymentProvider>) -> Self {
        let initiator = PaymentInitiator::new(
            self.stores.transactions.clone(),
            provider,
            self.settings.as_ref().clone(),
        );
        self.initiator = Some(Arc::new(initiator));
        self
    }

    pub fn with_config_info(mut self, info: Value) -> Self {
        self.config_info = Arc::new(info);
        self
    }

    pub fn provider_name(&self) -> Option<&'static str> {
        self.initiator.as_ref().map(|i| i.provider_name())
    }
}

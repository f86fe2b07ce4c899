pub mod callback;
pub mod coop_service;
pub mod email_service;
pub mod mpesa_service;
pub mod notifier;
pub mod order_service;
pub mod payment_initiator;
pub mod payment_provider;
pub mod reconciler;
pub mod status_service;

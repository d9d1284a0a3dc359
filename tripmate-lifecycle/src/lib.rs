pub mod actor;
pub mod gateway;
pub mod manager;
pub mod pin;
pub mod reconciler;
pub mod signature;
pub mod webhook;

pub use actor::Actor;
pub use gateway::RazorpayGateway;
pub use manager::RequestManager;
pub use reconciler::{PaymentError, PaymentReconciler, ReconcileOutcome};

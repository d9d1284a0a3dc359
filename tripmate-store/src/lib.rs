pub mod app_config;
pub mod database;
pub mod events;
pub mod payment_event_repo;
pub mod redis_repo;
pub mod request_repo;
pub mod user_repo;

pub use database::DbClient;
pub use events::EventProducer;
pub use payment_event_repo::StorePaymentEventRepository;
pub use redis_repo::RedisClient;
pub use request_repo::StoreRequestRepository;
pub use user_repo::StoreUserRepository;

use tripmate_core::CoreError;

pub(crate) fn storage_error(e: sqlx::Error) -> CoreError {
    CoreError::StorageError(e.to_string())
}

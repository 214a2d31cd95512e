pub mod app_config;
pub mod booking_repo;
pub mod database;
pub mod memory;

pub use app_config::Config;
pub use booking_repo::PgBookingStore;
pub use database::DbClient;
pub use memory::MemoryStore;

pub mod config;
pub mod errors;
pub mod models;
pub mod database;
pub mod memory;
pub mod services;
pub mod handlers;
pub mod metrics;

pub use config::Config;
pub use database::{Database, WalletStore, WalletTransaction};
pub use errors::{Result, WalletServiceError};
pub use memory::InMemoryWalletStore;
pub use services::WalletService;

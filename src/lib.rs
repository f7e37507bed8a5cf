pub mod catalog;
pub mod checker;
pub mod config;
pub mod diff;
pub mod dispatcher;
pub mod models;
pub mod plugins;
pub mod retry;
pub mod scheduler;
pub mod session;
pub mod snapshot;
pub mod utils;

// Re-export commonly used types
pub use config::AppConfig;
pub use scheduler::StockScheduler;
pub use utils::error::AppError;

pub type Result<T> = std::result::Result<T, AppError>;

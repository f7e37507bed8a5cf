pub mod product;
pub mod recipient;
pub mod stock;

// Re-exports for convenience
pub use product::*;
pub use recipient::*;
pub use stock::*;

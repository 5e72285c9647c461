//! HTTP request handlers.

pub mod common;
pub mod health;
pub mod preview;
pub mod product;
pub mod tryon;

pub use health::*;
pub use preview::*;
pub use product::*;
pub use tryon::*;

pub mod config;
pub mod context;
pub mod error;
pub mod owner;

pub use context::SyncContext;
pub use error::*;
pub use owner::Owner;

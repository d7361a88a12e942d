pub mod error;
pub mod config;
pub mod clock;
pub mod context;
pub mod document;
pub mod record;
pub mod handler;
pub mod service;
pub mod util;

pub use handler::{DocumentSessionHandler, SessionHandler};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod config;
pub mod error;
mod scheduler;
mod session;

pub use config::{PacingConfig, PacingOptions, WaitStrategy};
pub use error::ReplayError;
pub use scheduler::{ReplayOutcome, ReplayScheduler};
pub use session::ReplaySession;

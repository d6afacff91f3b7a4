mod config;
mod source;

pub use config::JsonlSourceConfig;
pub use source::JsonlSource;

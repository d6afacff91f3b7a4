pub mod serve;
pub mod sessions;

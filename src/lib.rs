pub mod config;
pub mod digest;
pub mod mock;
pub mod output;
pub mod portal;
pub mod preferences;
pub mod scoring;
pub mod server;
pub mod shift;
pub mod subscribers;
pub mod sync;

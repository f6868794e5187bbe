pub mod actions;
pub mod config;
pub mod engine;
pub mod error;
pub mod platform;
pub mod report;
pub mod repos;
pub mod shutdown;

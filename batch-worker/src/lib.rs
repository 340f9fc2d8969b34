pub mod config;
pub mod error;
pub mod handler;
pub mod persist;
pub mod processor;
pub mod repository;
pub mod router;
pub mod server;

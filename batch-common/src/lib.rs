pub mod message;
pub mod metrics;
pub mod sqs;

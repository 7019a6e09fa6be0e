//! Producer gateway: accepts log submissions over HTTP and publishes them to
//! a per-service Kafka topic, creating the topic on first use.

pub mod conf;
pub mod gateway;
pub mod metrics;
pub mod resolver;
pub mod route;
pub mod runtime;
pub mod state;

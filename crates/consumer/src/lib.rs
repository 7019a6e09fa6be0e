//! Ingest consumer: discovers per-service log topics, consumes them and
//! writes every well-formed record into the month-partitioned log store.

pub mod activity;
pub mod conf;
pub mod discovery;
pub mod ingest;
pub mod maintenance;
pub mod metrics;
pub mod route;
pub mod runtime;
pub mod state;

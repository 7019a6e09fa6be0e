// Shared building blocks for the Spunkless log pipeline.

// Core model
pub mod record;
pub mod topic;

// Infrastructure seams
pub mod broker;
pub mod store;

// Ambient concerns
pub mod retry;
pub mod settings;
pub mod telemetry;

pub use record::{LogRecord, LogSubmission, Metadata, RecordError};

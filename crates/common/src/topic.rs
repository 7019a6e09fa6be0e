//! One queue topic per service, `logs-<service>`.

use crate::record::RecordError;

/// Prefix shared by every log topic.
pub const LOG_TOPIC_PREFIX: &str = "logs-";

/// Kafka refuses topic names longer than this.
const MAX_TOPIC_LEN: usize = 249;

/// Derive the topic a service publishes to.
pub fn topic_for_service(service: &str) -> String {
    format!("{}{}", LOG_TOPIC_PREFIX, service)
}

/// Whether a broker topic follows the log-topic naming convention for `prefix`.
pub fn is_log_topic(topic: &str, prefix: &str) -> bool {
    topic.len() > prefix.len() && topic.starts_with(prefix)
}

/// Reject service names that cannot form a legal topic name.
pub fn validate_service(service: &str) -> Result<(), RecordError> {
    let legal_chars = service
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));

    if service.is_empty() || !legal_chars || LOG_TOPIC_PREFIX.len() + service.len() > MAX_TOPIC_LEN {
        return Err(RecordError::InvalidService(service.to_string()));
    }
    Ok(())
}

use std::collections::BTreeSet;

/// The topics the consumer is subscribed to. Only grows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicSet(BTreeSet<String>);

impl TopicSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Candidates not yet in the set, sorted and deduplicated.
    pub fn missing<'a>(&self, candidates: impl IntoIterator<Item = &'a String>) -> Vec<String> {
        candidates
            .into_iter()
            .filter(|t| !self.0.contains(*t))
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Add topics, returning how many were new.
    pub fn merge(&mut self, topics: impl IntoIterator<Item = String>) -> usize {
        let before = self.0.len();
        self.0.extend(topics);
        self.0.len() - before
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.0.contains(topic)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.0.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topics(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn missing_is_a_sorted_difference() {
        let mut set = TopicSet::new();
        set.merge(topics(&["logs-b"]));

        let candidates = topics(&["logs-c", "logs-a", "logs-b", "logs-a"]);
        assert_eq!(set.missing(&candidates), topics(&["logs-a", "logs-c"]));
    }

    #[test]
    fn merge_counts_only_new_topics() {
        let mut set = TopicSet::new();
        assert_eq!(set.merge(topics(&["logs-a", "logs-b"])), 2);
        assert_eq!(set.merge(topics(&["logs-b", "logs-c"])), 1);
        assert_eq!(set.to_vec(), topics(&["logs-a", "logs-b", "logs-c"]));
        assert!(set.contains("logs-c"));
    }
}

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Hiring-side profile a session is planned against.
///
/// `topic_weights` drives selection scoring; `must_have_topics` and
/// `nice_to_have_topics` feed the default weights when none are stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleProfile {
    pub role_id: Uuid,
    pub title: String,
    pub experience_level: String,
    #[serde(default)]
    pub must_have_topics: Vec<String>,
    #[serde(default)]
    pub nice_to_have_topics: Vec<String>,
    #[serde(default)]
    pub topic_weights: HashMap<String, f64>,
}

impl RoleProfile {
    /// Effective topic weights: stored weights when present, otherwise
    /// must-haves at 1.0 and nice-to-haves at 0.5.
    pub fn effective_weights(&self) -> HashMap<String, f64> {
        if !self.topic_weights.is_empty() {
            return self
                .topic_weights
                .iter()
                .map(|(k, v)| (k.trim().to_lowercase(), *v))
                .collect();
        }
        let mut weights = HashMap::new();
        for t in &self.must_have_topics {
            weights.insert(t.trim().to_lowercase(), 1.0);
        }
        for t in &self.nice_to_have_topics {
            weights.entry(t.trim().to_lowercase()).or_insert(0.5);
        }
        weights
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_weights_fall_back_to_topic_lists() {
        let profile = RoleProfile {
            role_id: Uuid::new_v4(),
            title: "Backend Engineer".to_string(),
            experience_level: "senior".to_string(),
            must_have_topics: vec!["Rust".to_string()],
            nice_to_have_topics: vec!["Kubernetes".to_string(), "rust".to_string()],
            topic_weights: HashMap::new(),
        };
        let w = profile.effective_weights();
        assert_eq!(w.get("rust"), Some(&1.0));
        assert_eq!(w.get("kubernetes"), Some(&0.5));
    }

    #[test]
    fn stored_weights_win_over_topic_lists() {
        let mut stored = HashMap::new();
        stored.insert("SQL".to_string(), 0.8);
        let profile = RoleProfile {
            role_id: Uuid::new_v4(),
            title: "Data Engineer".to_string(),
            experience_level: "mid".to_string(),
            must_have_topics: vec!["python".to_string()],
            nice_to_have_topics: vec![],
            topic_weights: stored,
        };
        let w = profile.effective_weights();
        assert_eq!(w.get("sql"), Some(&0.8));
        assert!(!w.contains_key("python"));
    }
}

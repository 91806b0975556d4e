use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The two question categories an interview plan interleaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionType {
    Open,
    Code,
}

/// Difficulty tier for code questions. Open questions usually carry none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn rank(self) -> u8 {
        match self {
            Difficulty::Easy => 0,
            Difficulty::Medium => 1,
            Difficulty::Hard => 2,
        }
    }
}

/// A bank question. Topic tags are treated as a case-insensitive set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: Uuid,
    pub question_type: QuestionType,
    pub difficulty: Option<Difficulty>,
    pub text: String,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_solution: Option<String>,
}

impl Question {
    /// Lowercased topic set used for overlap scoring and diversity checks.
    pub fn topic_set(&self) -> HashSet<String> {
        self.topics.iter().map(|t| t.trim().to_lowercase()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn question_type_serializes_lowercase() {
        let json = serde_json::to_string(&QuestionType::Code).unwrap();
        assert_eq!(json, "\"code\"");
        let back: QuestionType = serde_json::from_str("\"open\"").unwrap();
        assert_eq!(back, QuestionType::Open);
    }

    #[test]
    fn difficulty_ordering_matches_rank() {
        assert!(Difficulty::Easy < Difficulty::Medium);
        assert!(Difficulty::Medium.rank() < Difficulty::Hard.rank());
    }

    #[test]
    fn difficulty_works_as_a_map_key() {
        let mut best: std::collections::HashMap<Difficulty, u32> =
            std::collections::HashMap::new();
        best.insert(Difficulty::Easy, 1);
        best.insert(Difficulty::Easy, 2);
        best.insert(Difficulty::Hard, 3);
        assert_eq!(best.get(&Difficulty::Easy), Some(&2));
        assert_eq!(best.len(), 2);
    }

    #[test]
    fn topic_set_normalizes_case_and_whitespace() {
        let q = Question {
            id: Uuid::new_v4(),
            question_type: QuestionType::Open,
            difficulty: None,
            text: "Explain indexing.".to_string(),
            topics: vec!["SQL".to_string(), " sql ".to_string(), "Indexes".to_string()],
            reference_solution: None,
        };
        let set = q.topic_set();
        assert_eq!(set.len(), 2);
        assert!(set.contains("sql"));
        assert!(set.contains("indexes"));
    }
}

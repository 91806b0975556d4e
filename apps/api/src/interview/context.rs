//! Per-turn context assembled for the reasoning loop: the active question,
//! the candidate's submission, budget counters, and the running picture of
//! the candidate built from earlier analyses.

use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::models::question::QuestionType;
use crate::models::session::Persona;

/// What the session has learned about the candidate so far. Fed back into
/// the agent prompt on every turn.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CandidateProfile {
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
}

impl CandidateProfile {
    pub fn absorb(&mut self, strengths: &[String], gaps: &[String]) {
        for s in strengths {
            if !self.strengths.contains(s) {
                self.strengths.push(s.clone());
            }
        }
        for g in gaps {
            if !self.weaknesses.contains(g) {
                self.weaknesses.push(g.clone());
            }
        }
    }
}

/// An observed action effect, accumulated during the loop and serialized
/// into the reasoning trace.
#[derive(Debug, Clone, Serialize)]
pub struct Observation {
    pub action: String,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct TurnContext {
    pub session_id: Uuid,
    pub question_id: Uuid,
    pub question_text: String,
    pub question_type: QuestionType,
    pub question_topics: Vec<String>,
    pub reference_solution: Option<String>,
    pub transcript: String,
    pub code: Option<String>,
    pub question_index: usize,
    pub total_questions: usize,
    pub followup_count: u32,
    pub max_followups: u32,
    pub previous_followups: Vec<String>,
    pub persona: Persona,
    pub language: String,
    pub role_title: String,
    pub experience_level: String,
    pub profile: CandidateProfile,
    pub observations: Vec<Observation>,
}

impl TurnContext {
    pub fn is_last_question(&self) -> bool {
        self.total_questions > 0 && self.question_index == self.total_questions - 1
    }

    /// The loop must not ask another follow-up once the budget is spent.
    pub fn followup_budget_spent(&self) -> bool {
        self.followup_count >= self.max_followups
    }

    pub fn word_count(&self) -> usize {
        self.transcript.split_whitespace().count()
    }

    pub fn has_code(&self) -> bool {
        self.code
            .as_deref()
            .map(|c| !c.trim().is_empty())
            .unwrap_or(false)
    }

    pub fn observe(&mut self, action: &str, summary: impl Into<String>, score: Option<f64>) {
        self.observations.push(Observation {
            action: action.to_string(),
            summary: summary.into(),
            score,
        });
    }

    /// The opening user message of the reasoning conversation.
    pub fn initial_message(&self) -> String {
        let mut message = format!(
            "Question {} of {} ({:?}):\n{}\n\nCandidate's answer:\n{}",
            self.question_index + 1,
            self.total_questions,
            self.question_type,
            self.question_text,
            self.transcript
        );
        if let Some(code) = self.code.as_deref().filter(|c| !c.trim().is_empty()) {
            message.push_str("\n\nSubmitted code:\n```\n");
            message.push_str(code);
            message.push_str("\n```");
        }
        message.push_str(&format!(
            "\n\nFollow-ups used on this question: {} of {}.",
            self.followup_count, self.max_followups
        ));
        if !self.previous_followups.is_empty() {
            message.push_str("\nAlready asked as follow-ups:\n");
            for q in &self.previous_followups {
                message.push_str(&format!("- {q}\n"));
            }
        }
        if self.is_last_question() {
            message.push_str("\nThis is the final question of the interview.");
        }
        message
    }

    /// Candidate picture for the system prompt.
    pub fn profile_summary(&self) -> String {
        if self.profile.strengths.is_empty() && self.profile.weaknesses.is_empty() {
            return String::new();
        }
        format!(
            "Observed so far: strengths [{}], weaker areas [{}].",
            self.profile.strengths.join(", "),
            self.profile.weaknesses.join(", ")
        )
    }

    /// Serializes the accumulated observations for the persisted trace.
    pub fn observations_json(&self) -> Value {
        json!(self.observations)
    }
}

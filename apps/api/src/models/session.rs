use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::plan::InterviewPlan;

/// Interviewer persona preset. Shapes prompt tone, never the flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Persona {
    #[default]
    Friendly,
    Formal,
    Challenging,
}

fn default_num_open() -> usize {
    4
}
fn default_num_code() -> usize {
    2
}
fn default_duration() -> u32 {
    12
}
fn default_style_slider() -> u8 {
    50
}
fn default_language() -> String {
    "english".to_string()
}
fn default_max_followups() -> u32 {
    2
}

/// Per-session knobs. Every field has a default so a request body of `{}`
/// yields a sensible interview.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterviewSettings {
    #[serde(default = "default_num_open")]
    pub num_open: usize,
    #[serde(default = "default_num_code")]
    pub num_code: usize,
    #[serde(default = "default_duration")]
    pub duration_minutes: u32,
    #[serde(default)]
    pub persona: Persona,
    /// 0 = fully technical emphasis, 100 = fully personal/behavioral.
    #[serde(default = "default_style_slider")]
    pub style_slider: u8,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_max_followups")]
    pub max_followups: u32,
}

impl Default for InterviewSettings {
    fn default() -> Self {
        InterviewSettings {
            num_open: default_num_open(),
            num_code: default_num_code(),
            duration_minutes: default_duration(),
            persona: Persona::default(),
            style_slider: default_style_slider(),
            language: default_language(),
            max_followups: default_max_followups(),
        }
    }
}

/// Where the conversation currently stands.
///
/// Invariant: when `question_index` points past the plan, `followup_count` is
/// zero and `previous_followups` is empty. `advance()` and `finish()` are the
/// only transitions that move `question_index`, and both reset the follow-up
/// residue.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationState {
    pub question_index: usize,
    pub followup_count: u32,
    #[serde(default)]
    pub previous_followups: Vec<String>,
    /// Id of the question currently on the table.
    #[serde(default)]
    pub current_question_id: Option<Uuid>,
    /// The follow-up question currently on the table, when one is pending.
    #[serde(default)]
    pub pending_followup: Option<String>,
    /// Anchor for follow-up turns: the id of the main-answer turn they refine.
    #[serde(default)]
    pub active_turn_id: Option<Uuid>,
    #[serde(default)]
    pub last_score: Option<f64>,
    /// Write-once cache of refined question text, keyed by plan slot.
    #[serde(default)]
    pub refined_questions: HashMap<usize, String>,
}

impl ConversationState {
    /// Moves to the next slot and clears all follow-up residue.
    pub fn advance(&mut self) {
        self.question_index += 1;
        self.followup_count = 0;
        self.previous_followups.clear();
        self.pending_followup = None;
        self.current_question_id = None;
        self.active_turn_id = None;
    }

    /// Registers an asked follow-up against the current slot.
    pub fn record_followup(&mut self, question: String) {
        self.followup_count += 1;
        self.previous_followups.push(question.clone());
        self.pending_followup = Some(question);
    }

    /// Jumps directly to `slot`, clearing follow-up residue.
    pub fn jump_to(&mut self, slot: usize) {
        self.question_index = slot;
        self.followup_count = 0;
        self.previous_followups.clear();
        self.pending_followup = None;
        self.current_question_id = None;
        self.active_turn_id = None;
    }

    pub fn refined(&self, slot: usize) -> Option<&str> {
        self.refined_questions.get(&slot).map(|s| s.as_str())
    }

    /// First write wins; returns whether this call performed the write.
    pub fn cache_refined(&mut self, slot: usize, text: String) -> bool {
        if self.refined_questions.contains_key(&slot) {
            return false;
        }
        self.refined_questions.insert(slot, text);
        true
    }
}

/// Rubric sub-scores produced by code evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rubric {
    pub correctness: f64,
    pub efficiency: f64,
    pub style: f64,
}

/// Structured score attached to a recorded turn. `overall` is always in
/// [0.0, 1.0]; the rubric is present only for evaluated code answers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnScore {
    pub overall: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rubric: Option<Rubric>,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub gaps: Vec<String>,
    #[serde(default)]
    pub notes: String,
}

impl TurnScore {
    pub fn overall(value: f64) -> Self {
        TurnScore {
            overall: value.clamp(0.0, 1.0),
            rubric: None,
            strengths: Vec::new(),
            gaps: Vec::new(),
            notes: String::new(),
        }
    }
}

/// Immutable record of one answered exchange. Never mutated after commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterviewTurn {
    pub id: Uuid,
    pub session_id: Uuid,
    pub turn_index: u32,
    pub question_id: Uuid,
    pub question_snapshot: String,
    pub transcript: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub score: TurnScore,
    pub is_followup: bool,
    #[serde(default)]
    pub parent_turn_id: Option<Uuid>,
    pub question_number: usize,
    pub agent_action: String,
    /// Ordered reasoning trace, persisted for audit and never replayed.
    pub reasoning_trace: Value,
    pub created_at: DateTime<Utc>,
}

/// One interview session: plan, live state, and settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterviewSession {
    pub id: Uuid,
    pub candidate_id: Uuid,
    pub role_id: Uuid,
    /// CV the candidate applied with, when one was attached at start.
    #[serde(default)]
    pub cv_id: Option<Uuid>,
    pub plan: InterviewPlan,
    pub state: ConversationState,
    pub settings: InterviewSettings,
    /// Count of committed turns; the next turn's `turn_index`.
    #[serde(default)]
    pub turn_count: u32,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
}

impl InterviewSession {
    pub fn new(
        candidate_id: Uuid,
        role_id: Uuid,
        plan: InterviewPlan,
        settings: InterviewSettings,
    ) -> Self {
        InterviewSession {
            id: Uuid::new_v4(),
            candidate_id,
            role_id,
            cv_id: None,
            plan,
            state: ConversationState::default(),
            settings,
            turn_count: 0,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    pub fn with_cv(mut self, cv_id: Option<Uuid>) -> Self {
        self.cv_id = cv_id;
        self
    }

    pub fn is_ended(&self) -> bool {
        self.ended_at.is_some()
    }

    /// True once the state has walked past the last plan slot.
    pub fn is_complete(&self) -> bool {
        self.state.question_index >= self.plan.len()
    }

    pub fn is_last_question(&self) -> bool {
        self.plan.len() > 0 && self.state.question_index == self.plan.len() - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::plan::{PlanCandidate, PlanItem};
    use crate::models::question::QuestionType;

    fn make_plan(slots: usize) -> InterviewPlan {
        let items = (0..slots)
            .map(|slot| {
                let id = Uuid::new_v4();
                PlanItem {
                    slot,
                    question_type: QuestionType::Open,
                    candidates: vec![PlanCandidate {
                        question_id: id,
                        difficulty: None,
                        topics: vec![],
                        score: 1.0,
                    }],
                    selected_question_id: id,
                    presented: false,
                }
            })
            .collect();
        InterviewPlan { items }
    }

    #[test]
    fn settings_default_from_empty_json() {
        let settings: InterviewSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings.num_open, 4);
        assert_eq!(settings.num_code, 2);
        assert_eq!(settings.max_followups, 2);
        assert_eq!(settings.persona, Persona::Friendly);
        assert_eq!(settings.language, "english");
    }

    #[test]
    fn advance_clears_followup_residue() {
        let mut state = ConversationState::default();
        state.record_followup("Can you expand on that?".to_string());
        state.record_followup("What about failure modes?".to_string());
        assert_eq!(state.followup_count, 2);
        state.active_turn_id = Some(Uuid::new_v4());

        state.advance();
        assert_eq!(state.question_index, 1);
        assert_eq!(state.followup_count, 0);
        assert!(state.previous_followups.is_empty());
        assert!(state.pending_followup.is_none());
        assert!(state.active_turn_id.is_none());
    }

    #[test]
    fn refined_cache_is_write_once() {
        let mut state = ConversationState::default();
        assert!(state.cache_refined(0, "first".to_string()));
        assert!(!state.cache_refined(0, "second".to_string()));
        assert_eq!(state.refined(0), Some("first"));
    }

    #[test]
    fn refined_cache_survives_serde_round_trip() {
        let mut state = ConversationState::default();
        state.cache_refined(3, "refined text".to_string());
        let json = serde_json::to_string(&state).unwrap();
        let back: ConversationState = serde_json::from_str(&json).unwrap();
        assert_eq!(back.refined(3), Some("refined text"));
    }

    #[test]
    fn turn_score_clamps_overall() {
        assert_eq!(TurnScore::overall(1.4).overall, 1.0);
        assert_eq!(TurnScore::overall(-0.2).overall, 0.0);
    }

    #[test]
    fn session_completion_and_last_question() {
        let mut session = InterviewSession::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            make_plan(2),
            InterviewSettings::default(),
        );
        assert!(!session.is_last_question());
        session.state.advance();
        assert!(session.is_last_question());
        session.state.advance();
        assert!(session.is_complete());
    }
}

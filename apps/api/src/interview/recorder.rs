//! Turn recorder: converts a terminal decision plus the raw candidate input
//! into an immutable turn record, applies the state transition, and commits
//! both atomically. Also owns question presentation (refinement cache,
//! adaptive difficulty swap, asked-history rows).

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::llm_client::chain::FallbackChain;
use crate::models::question::{Question, QuestionType};
use crate::models::session::{InterviewSession, InterviewTurn, Rubric, TurnScore};
use crate::selection;
use crate::store::{QuestionStore, SessionStore};

use super::guardrails;
use super::prompts;
use super::reasoning::{AgentAction, AgentDecision};

/// The next question as presented to the candidate.
#[derive(Debug, Clone, Serialize)]
pub struct NextQuestion {
    pub question_id: Uuid,
    pub text: String,
    pub question_type: QuestionType,
    pub topics: Vec<String>,
    pub question_number: usize,
}

/// Outcome of recording one turn.
#[derive(Debug)]
pub struct RecordedTurn {
    pub turn_id: Uuid,
    pub action: AgentAction,
    pub message: String,
    pub followup_question: Option<String>,
    pub next_question: Option<NextQuestion>,
    pub is_done: bool,
}

pub struct TurnRecorder<'a> {
    sessions: &'a dyn SessionStore,
    questions: &'a dyn QuestionStore,
    chain: &'a FallbackChain,
}

impl<'a> TurnRecorder<'a> {
    pub fn new(
        sessions: &'a dyn SessionStore,
        questions: &'a dyn QuestionStore,
        chain: &'a FallbackChain,
    ) -> Self {
        Self {
            sessions,
            questions,
            chain,
        }
    }

    /// Refined (localized, rephrased) question text for a slot. Write-once:
    /// the first call generates and caches, later calls read the cache.
    async fn refined_text(
        &self,
        session: &mut InterviewSession,
        slot: usize,
        question: &Question,
    ) -> String {
        if let Some(cached) = session.state.refined(slot) {
            return cached.to_string();
        }
        let refined = match self
            .chain
            .complete(
                prompts::REFINE_SYSTEM,
                &prompts::refine_prompt(
                    &question.text,
                    question.question_type,
                    &session.settings.language,
                    session.settings.persona,
                ),
            )
            .await
        {
            Ok(text) => {
                let text = text.trim().to_string();
                if text.is_empty() || guardrails::filter_question(&text).is_none() {
                    question.text.clone()
                } else {
                    text
                }
            }
            Err(e) => {
                warn!(slot, "question refinement unavailable, using bank text: {e}");
                question.text.clone()
            }
        };
        session.state.cache_refined(slot, refined.clone());
        refined
    }

    /// Materializes a slot for presentation: resolves the selected question,
    /// refines its text, marks the slot presented, and points the state at
    /// it. Does not persist; callers commit.
    pub async fn prepare_slot(
        &self,
        session: &mut InterviewSession,
        slot: usize,
    ) -> Result<NextQuestion, AppError> {
        let question_id = session
            .plan
            .item(slot)
            .map(|i| i.selected_question_id)
            .ok_or_else(|| AppError::NotFound(format!("plan slot {slot} does not exist")))?;
        let question = self
            .questions
            .get_question(question_id)
            .await?
            .ok_or_else(|| {
                AppError::Config(format!("plan references missing question {question_id}"))
            })?;

        let text = self.refined_text(session, slot, &question).await;
        if let Some(item) = session.plan.item_mut(slot) {
            item.presented = true;
        }
        session.state.current_question_id = Some(question.id);

        Ok(NextQuestion {
            question_id: question.id,
            text,
            question_type: question.question_type,
            topics: question.topics,
            question_number: slot,
        })
    }

    /// Appends the asked-history row for a presented question.
    pub async fn note_presented(
        &self,
        session: &InterviewSession,
        question_id: Uuid,
    ) -> Result<(), AppError> {
        self.questions
            .record_asked(session.candidate_id, session.role_id, session.id, question_id)
            .await
    }

    fn build_score(decision: &AgentDecision) -> TurnScore {
        let mut score = TurnScore::overall(decision.satisfaction_score);
        if let Some(evaluation) = &decision.code_evaluation {
            score.rubric = Some(Rubric {
                correctness: evaluation.correctness,
                efficiency: evaluation.efficiency,
                style: evaluation.style,
            });
            score.gaps = evaluation.issues.clone();
            score.notes = evaluation.summary.clone();
        }
        if let Some(analysis) = &decision.analysis {
            score.strengths = analysis.strengths.clone();
            if score.gaps.is_empty() {
                score.gaps = analysis.gaps.clone();
            }
            if score.notes.is_empty() {
                score.notes = analysis.summary.clone();
            }
        }
        score
    }

    /// The commit point: builds the immutable turn, applies the state
    /// transition for the decision, persists both atomically, and returns
    /// what the candidate should see next.
    pub async fn record(
        &self,
        session: &mut InterviewSession,
        question: &Question,
        question_text: &str,
        transcript: &str,
        code: Option<&str>,
        decision: &AgentDecision,
    ) -> Result<RecordedTurn, AppError> {
        let is_followup = session.state.followup_count > 0;
        let turn_id = Uuid::new_v4();
        let turn = InterviewTurn {
            id: turn_id,
            session_id: session.id,
            turn_index: session.turn_count,
            question_id: question.id,
            question_snapshot: question_text.to_string(),
            transcript: transcript.to_string(),
            code: code.map(str::to_string),
            score: Self::build_score(decision),
            is_followup,
            parent_turn_id: if is_followup {
                session.state.active_turn_id
            } else {
                None
            },
            question_number: session.state.question_index,
            agent_action: decision.action.as_str().to_string(),
            reasoning_trace: decision.trace_json(),
            created_at: Utc::now(),
        };
        session.turn_count += 1;
        session.state.last_score = Some(decision.satisfaction_score);
        // a main answer becomes the anchor its follow-ups link back to
        if !is_followup {
            session.state.active_turn_id = Some(turn_id);
        }

        let mut next_question: Option<NextQuestion> = None;
        match decision.action {
            AgentAction::Followup => {
                if let Some(q) = &decision.followup_question {
                    session.state.record_followup(q.clone());
                }
            }
            AgentAction::Hint => {
                // the candidate retries the same question
            }
            AgentAction::Advance => {
                session.state.advance();
                let slot = session.state.question_index;
                if !session.is_complete() {
                    if let Some(item) = session.plan.item_mut(slot) {
                        selection::adapt_slot_difficulty(item, decision.satisfaction_score);
                    }
                    next_question = Some(self.prepare_slot(session, slot).await?);
                }
            }
            AgentAction::End => {
                session.state.advance();
                session.ended_at = Some(Utc::now());
            }
        }

        self.sessions.commit_turn(session, &turn).await?;
        if let Some(next) = &next_question {
            self.note_presented(session, next.question_id).await?;
        }

        info!(
            session_id = %session.id,
            turn_index = turn.turn_index,
            action = decision.action.as_str(),
            score = decision.satisfaction_score,
            "turn recorded"
        );

        Ok(RecordedTurn {
            turn_id,
            action: decision.action,
            message: decision.message.clone(),
            followup_question: decision.followup_question.clone(),
            next_question,
            is_done: decision.action == AgentAction::End,
        })
    }
}

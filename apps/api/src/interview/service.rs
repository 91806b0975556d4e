//! The interview orchestration service behind the HTTP handlers. Owns the
//! stores, the backend chain, and the per-session turn guards that keep
//! submissions strictly sequential.

use std::sync::Arc;

use dashmap::DashMap;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::llm_client::chain::FallbackChain;
use crate::models::question::Question;
use crate::models::session::{InterviewSession, InterviewSettings};
use crate::selection::{self, PlanRequest, SelectionConfig};
use crate::store::{QuestionStore, RoleProfileStore, SessionStore};

use super::context::{CandidateProfile, TurnContext};
use super::prompts;
use super::reasoning::ReasoningLoop;
use super::recorder::{NextQuestion, TurnRecorder};

#[derive(Debug, Deserialize)]
pub struct StartInterviewRequest {
    pub candidate_id: Uuid,
    pub role_id: Uuid,
    #[serde(default)]
    pub cv_id: Option<Uuid>,
    #[serde(default)]
    pub settings: InterviewSettings,
}

#[derive(Debug, Serialize)]
pub struct StartInterviewResponse {
    pub session_id: Uuid,
    pub message: String,
    pub question: NextQuestion,
    pub total_questions: usize,
}

#[derive(Debug, Deserialize)]
pub struct SubmitAnswerRequest {
    pub session_id: Uuid,
    pub transcript: String,
    #[serde(default)]
    pub code: Option<String>,
    /// Client's view of whether this answers a follow-up. Advisory only; the
    /// session state decides.
    #[serde(default)]
    pub is_followup: bool,
}

#[derive(Debug, Serialize)]
pub struct Progress {
    pub question_index: usize,
    pub total_questions: usize,
    pub turn_index: u32,
}

#[derive(Debug, Serialize)]
pub struct SubmitAnswerResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub followup_question: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_question: Option<NextQuestion>,
    pub agent_action: String,
    pub is_done: bool,
    pub progress: Progress,
}

#[derive(Debug, Serialize)]
pub struct EndInterviewResponse {
    pub session_id: Uuid,
    pub ended: bool,
    pub turns_recorded: u32,
}

#[derive(Debug, Serialize)]
pub struct SkipToCodeResponse {
    pub message: String,
    pub question: NextQuestion,
}

pub struct InterviewService {
    questions: Arc<dyn QuestionStore>,
    sessions: Arc<dyn SessionStore>,
    roles: Arc<dyn RoleProfileStore>,
    chain: Arc<FallbackChain>,
    selection: SelectionConfig,
    // one guard per session; a held guard means a turn is in flight
    turn_guards: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl InterviewService {
    pub fn new(
        questions: Arc<dyn QuestionStore>,
        sessions: Arc<dyn SessionStore>,
        roles: Arc<dyn RoleProfileStore>,
        chain: Arc<FallbackChain>,
    ) -> Self {
        InterviewService {
            questions,
            sessions,
            roles,
            chain,
            selection: SelectionConfig::default(),
            turn_guards: DashMap::new(),
        }
    }

    pub fn with_selection(mut self, selection: SelectionConfig) -> Self {
        self.selection = selection;
        self
    }

    fn recorder(&self) -> TurnRecorder<'_> {
        TurnRecorder::new(self.sessions.as_ref(), self.questions.as_ref(), &self.chain)
    }

    fn guard_for(&self, session_id: Uuid) -> Arc<Mutex<()>> {
        self.turn_guards
            .entry(session_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn load_session(&self, id: Uuid) -> Result<InterviewSession, AppError> {
        self.sessions
            .load_session(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("session {id} not found")))
    }

    pub async fn start_interview(
        &self,
        request: StartInterviewRequest,
    ) -> Result<StartInterviewResponse, AppError> {
        let profile = self
            .roles
            .get_profile(request.role_id)
            .await?
            .ok_or_else(|| {
                AppError::Config(format!("no role profile for role {}", request.role_id))
            })?;

        let mut rng = StdRng::from_entropy();
        let plan = selection::build_plan(
            self.questions.as_ref(),
            &self.selection,
            &PlanRequest {
                candidate_id: request.candidate_id,
                role_id: request.role_id,
                profile: &profile,
                settings: &request.settings,
            },
            &mut rng,
        )
        .await?;

        let mut session = InterviewSession::new(
            request.candidate_id,
            request.role_id,
            plan,
            request.settings,
        )
        .with_cv(request.cv_id);

        let recorder = self.recorder();
        let question = recorder.prepare_slot(&mut session, 0).await?;
        self.sessions.create_session(&session).await?;
        recorder.note_presented(&session, question.question_id).await?;

        info!(
            session_id = %session.id,
            candidate_id = %session.candidate_id,
            questions = session.plan.len(),
            "interview started"
        );

        Ok(StartInterviewResponse {
            session_id: session.id,
            message: prompts::greeting_message(&session.settings.language, &profile.title),
            total_questions: session.plan.len(),
            question,
        })
    }

    /// Resolves the question currently on the table, with the text the
    /// candidate actually saw: a pending follow-up when one exists, the
    /// refined slot text otherwise.
    async fn current_question(
        &self,
        session: &InterviewSession,
    ) -> Result<(Question, String), AppError> {
        let slot = session.state.question_index;
        let question_id = session
            .state
            .current_question_id
            .or_else(|| session.plan.item(slot).map(|i| i.selected_question_id))
            .ok_or_else(|| AppError::Conflict("session has no active question".to_string()))?;
        let question = self
            .questions
            .get_question(question_id)
            .await?
            .ok_or_else(|| {
                AppError::Config(format!("session references missing question {question_id}"))
            })?;
        let text = session
            .state
            .pending_followup
            .clone()
            .or_else(|| session.state.refined(slot).map(str::to_string))
            .unwrap_or_else(|| question.text.clone());
        Ok((question, text))
    }

    /// Rebuilds the candidate picture from the committed turns.
    async fn candidate_profile(&self, session_id: Uuid) -> Result<CandidateProfile, AppError> {
        let mut profile = CandidateProfile::default();
        for turn in self.sessions.list_turns(session_id).await? {
            profile.absorb(&turn.score.strengths, &turn.score.gaps);
        }
        Ok(profile)
    }

    pub async fn submit_answer(
        &self,
        request: SubmitAnswerRequest,
    ) -> Result<SubmitAnswerResponse, AppError> {
        if request.transcript.trim().is_empty() {
            return Err(AppError::Validation("transcript must not be empty".to_string()));
        }

        let guard = self.guard_for(request.session_id);
        let _held = guard.try_lock().map_err(|_| {
            AppError::Conflict("a turn for this session is already being processed".to_string())
        })?;

        let mut session = self.load_session(request.session_id).await?;
        if session.is_ended() || session.is_complete() {
            return Ok(SubmitAnswerResponse {
                message: prompts::closing_message(&session.settings.language),
                followup_question: None,
                next_question: None,
                agent_action: "end".to_string(),
                is_done: true,
                progress: Progress {
                    question_index: session.state.question_index,
                    total_questions: session.plan.len(),
                    turn_index: session.turn_count,
                },
            });
        }

        let role = self
            .roles
            .get_profile(session.role_id)
            .await?
            .ok_or_else(|| {
                AppError::Config(format!("no role profile for role {}", session.role_id))
            })?;
        let answering_followup = session.state.followup_count > 0;
        if request.is_followup != answering_followup {
            warn!(
                session_id = %session.id,
                claimed = request.is_followup,
                actual = answering_followup,
                "client follow-up flag disagrees with session state, using session state"
            );
        }

        let (question, question_text) = self.current_question(&session).await?;
        let candidate_profile = self.candidate_profile(session.id).await?;

        let mut ctx = TurnContext {
            session_id: session.id,
            question_id: question.id,
            question_text: question_text.clone(),
            question_type: question.question_type,
            question_topics: question.topics.clone(),
            reference_solution: question.reference_solution.clone(),
            transcript: request.transcript.clone(),
            code: request.code.clone(),
            question_index: session.state.question_index,
            total_questions: session.plan.len(),
            followup_count: session.state.followup_count,
            max_followups: session.settings.max_followups,
            previous_followups: session.state.previous_followups.clone(),
            persona: session.settings.persona,
            language: session.settings.language.clone(),
            role_title: role.title.clone(),
            experience_level: role.experience_level.clone(),
            profile: candidate_profile,
            observations: Vec::new(),
        };

        let decision = ReasoningLoop::new(&self.chain).run(&mut ctx).await;
        let recorded = self
            .recorder()
            .record(
                &mut session,
                &question,
                &question_text,
                &request.transcript,
                request.code.as_deref(),
                &decision,
            )
            .await?;

        if recorded.is_done {
            self.turn_guards.remove(&session.id);
        }

        Ok(SubmitAnswerResponse {
            message: recorded.message,
            followup_question: recorded.followup_question,
            next_question: recorded.next_question,
            agent_action: recorded.action.as_str().to_string(),
            is_done: recorded.is_done,
            progress: Progress {
                question_index: session.state.question_index,
                total_questions: session.plan.len(),
                turn_index: session.turn_count.saturating_sub(1),
            },
        })
    }

    /// Explicit early termination, e.g. the candidate closed the call.
    /// Serialized against in-flight turns by the same guard as
    /// `submit_answer`; ending while a turn is processing is a conflict.
    pub async fn end_interview(&self, session_id: Uuid) -> Result<EndInterviewResponse, AppError> {
        let guard = self.guard_for(session_id);
        let _held = guard.try_lock().map_err(|_| {
            AppError::Conflict("a turn for this session is already being processed".to_string())
        })?;

        let mut session = self.load_session(session_id).await?;
        if !session.is_ended() {
            session.ended_at = Some(chrono::Utc::now());
            self.sessions.save_session(&session).await?;
            info!(session_id = %session.id, turns = session.turn_count, "interview ended");
        }
        // dropped only while held here; a racer building a fresh guard loads
        // the already-ended session and takes the read-only path
        self.turn_guards.remove(&session_id);
        Ok(EndInterviewResponse {
            session_id,
            ended: true,
            turns_recorded: session.turn_count,
        })
    }

    /// Jumps the session to its first code slot, skipping any open questions
    /// still remaining before it.
    pub async fn skip_to_code_section(
        &self,
        session_id: Uuid,
    ) -> Result<SkipToCodeResponse, AppError> {
        let guard = self.guard_for(session_id);
        let _held = guard.try_lock().map_err(|_| {
            AppError::Conflict("a turn for this session is already being processed".to_string())
        })?;

        let mut session = self.load_session(session_id).await?;
        if session.is_ended() || session.is_complete() {
            return Err(AppError::Conflict("interview already ended".to_string()));
        }
        let slot = session
            .plan
            .first_code_slot()
            .ok_or_else(|| AppError::NotFound("plan has no code questions".to_string()))?;
        if session.state.question_index >= slot {
            return Err(AppError::Validation(
                "session is already at or past the code section".to_string(),
            ));
        }

        session.state.jump_to(slot);
        let recorder = self.recorder();
        let question = recorder.prepare_slot(&mut session, slot).await?;
        self.sessions.save_session(&session).await?;
        recorder.note_presented(&session, question.question_id).await?;

        info!(session_id = %session.id, slot, "skipped to code section");

        Ok(SkipToCodeResponse {
            message: prompts::code_section_message(&session.settings.language),
            question,
        })
    }
}

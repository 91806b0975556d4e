//! Persistence interfaces.
//!
//! The interview engine only sees these traits. `postgres` backs production;
//! `memory` backs tests and local demos.

pub mod memory;
pub mod postgres;

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::question::{Question, QuestionType};
use crate::models::role::RoleProfile;
use crate::models::session::{InterviewSession, InterviewTurn};

#[async_trait]
pub trait QuestionStore: Send + Sync {
    async fn get_question(&self, id: Uuid) -> Result<Option<Question>, AppError>;

    async fn list_questions(
        &self,
        question_type: QuestionType,
    ) -> Result<Vec<Question>, AppError>;

    /// Records that a question was presented to a candidate for a role.
    async fn record_asked(
        &self,
        candidate_id: Uuid,
        role_id: Uuid,
        session_id: Uuid,
        question_id: Uuid,
    ) -> Result<(), AppError>;

    /// Question ids presented to this candidate for this role within the
    /// recency window: at most `max_sessions` most recent sessions, none
    /// older than `since`.
    async fn recently_asked(
        &self,
        candidate_id: Uuid,
        role_id: Uuid,
        since: DateTime<Utc>,
        max_sessions: usize,
    ) -> Result<HashSet<Uuid>, AppError>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(&self, session: &InterviewSession) -> Result<(), AppError>;

    async fn load_session(&self, id: Uuid) -> Result<Option<InterviewSession>, AppError>;

    async fn save_session(&self, session: &InterviewSession) -> Result<(), AppError>;

    /// Persists the turn and the updated session atomically. Either both land
    /// or neither does.
    async fn commit_turn(
        &self,
        session: &InterviewSession,
        turn: &InterviewTurn,
    ) -> Result<(), AppError>;

    async fn list_turns(&self, session_id: Uuid) -> Result<Vec<InterviewTurn>, AppError>;
}

#[async_trait]
pub trait RoleProfileStore: Send + Sync {
    async fn get_profile(&self, role_id: Uuid) -> Result<Option<RoleProfile>, AppError>;
}

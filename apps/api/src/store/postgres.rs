//! Postgres store implementations (runtime sqlx queries, no macros).
//!
//! Expected tables: `questions`, `role_profiles`, `interview_sessions`,
//! `interview_turns`, `question_history`. Plan, state, settings, scores, and
//! traces live in jsonb columns.

use std::collections::{HashMap, HashSet};

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::question::{Difficulty, Question, QuestionType};
use crate::models::role::RoleProfile;
use crate::models::session::{InterviewSession, InterviewTurn};

use super::{QuestionStore, RoleProfileStore, SessionStore};

fn parse_question_type(raw: &str) -> Result<QuestionType, AppError> {
    match raw {
        "open" => Ok(QuestionType::Open),
        "code" => Ok(QuestionType::Code),
        other => Err(AppError::Internal(anyhow!(
            "unknown question type in database: {other}"
        ))),
    }
}

fn parse_difficulty(raw: Option<&str>) -> Result<Option<Difficulty>, AppError> {
    match raw {
        None => Ok(None),
        Some("easy") => Ok(Some(Difficulty::Easy)),
        Some("medium") => Ok(Some(Difficulty::Medium)),
        Some("hard") => Ok(Some(Difficulty::Hard)),
        Some(other) => Err(AppError::Internal(anyhow!(
            "unknown difficulty in database: {other}"
        ))),
    }
}

fn from_json<T: serde::de::DeserializeOwned>(value: Value, what: &str) -> Result<T, AppError> {
    serde_json::from_value(value)
        .map_err(|e| AppError::Internal(anyhow!("corrupt {what} column: {e}")))
}

fn to_json<T: serde::Serialize>(value: &T, what: &str) -> Result<Value, AppError> {
    serde_json::to_value(value)
        .map_err(|e| AppError::Internal(anyhow!("failed to serialize {what}: {e}")))
}

fn map_question(row: &PgRow) -> Result<Question, AppError> {
    let question_type: String = row.try_get("question_type")?;
    let difficulty: Option<String> = row.try_get("difficulty")?;
    let topics: Value = row.try_get("topics")?;
    Ok(Question {
        id: row.try_get("id")?,
        question_type: parse_question_type(&question_type)?,
        difficulty: parse_difficulty(difficulty.as_deref())?,
        text: row.try_get("text")?,
        topics: from_json(topics, "topics")?,
        reference_solution: row.try_get("reference_solution")?,
    })
}

pub struct PgQuestionStore {
    pool: PgPool,
}

impl PgQuestionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QuestionStore for PgQuestionStore {
    async fn get_question(&self, id: Uuid) -> Result<Option<Question>, AppError> {
        let row = sqlx::query(
            "SELECT id, question_type, difficulty, text, topics, reference_solution \
             FROM questions WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(map_question).transpose()
    }

    async fn list_questions(
        &self,
        question_type: QuestionType,
    ) -> Result<Vec<Question>, AppError> {
        let type_str = match question_type {
            QuestionType::Open => "open",
            QuestionType::Code => "code",
        };
        let rows = sqlx::query(
            "SELECT id, question_type, difficulty, text, topics, reference_solution \
             FROM questions WHERE question_type = $1",
        )
        .bind(type_str)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(map_question).collect()
    }

    async fn record_asked(
        &self,
        candidate_id: Uuid,
        role_id: Uuid,
        session_id: Uuid,
        question_id: Uuid,
    ) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO question_history \
             (candidate_id, role_id, session_id, question_id, asked_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(candidate_id)
        .bind(role_id)
        .bind(session_id)
        .bind(question_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recently_asked(
        &self,
        candidate_id: Uuid,
        role_id: Uuid,
        since: DateTime<Utc>,
        max_sessions: usize,
    ) -> Result<HashSet<Uuid>, AppError> {
        let session_rows = sqlx::query(
            "SELECT session_id, MAX(asked_at) AS latest \
             FROM question_history \
             WHERE candidate_id = $1 AND role_id = $2 AND asked_at >= $3 \
             GROUP BY session_id ORDER BY latest DESC LIMIT $4",
        )
        .bind(candidate_id)
        .bind(role_id)
        .bind(since)
        .bind(max_sessions as i64)
        .fetch_all(&self.pool)
        .await?;

        let session_ids: Vec<Uuid> = session_rows
            .iter()
            .map(|r| r.try_get("session_id"))
            .collect::<Result<_, _>>()?;
        if session_ids.is_empty() {
            return Ok(HashSet::new());
        }

        let rows = sqlx::query(
            "SELECT DISTINCT question_id FROM question_history \
             WHERE candidate_id = $1 AND role_id = $2 AND session_id = ANY($3)",
        )
        .bind(candidate_id)
        .bind(role_id)
        .bind(&session_ids)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| r.try_get("question_id").map_err(AppError::from))
            .collect()
    }
}

pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn map_session(row: &PgRow) -> Result<InterviewSession, AppError> {
    Ok(InterviewSession {
        id: row.try_get("id")?,
        candidate_id: row.try_get("candidate_id")?,
        role_id: row.try_get("role_id")?,
        cv_id: row.try_get("cv_id")?,
        plan: from_json(row.try_get("plan")?, "plan")?,
        state: from_json(row.try_get("state")?, "state")?,
        settings: from_json(row.try_get("settings")?, "settings")?,
        turn_count: row.try_get::<i32, _>("turn_count")? as u32,
        started_at: row.try_get("started_at")?,
        ended_at: row.try_get("ended_at")?,
    })
}

fn map_turn(row: &PgRow) -> Result<InterviewTurn, AppError> {
    Ok(InterviewTurn {
        id: row.try_get("id")?,
        session_id: row.try_get("session_id")?,
        turn_index: row.try_get::<i32, _>("turn_index")? as u32,
        question_id: row.try_get("question_id")?,
        question_snapshot: row.try_get("question_snapshot")?,
        transcript: row.try_get("transcript")?,
        code: row.try_get("code")?,
        score: from_json(row.try_get("score")?, "score")?,
        is_followup: row.try_get("is_followup")?,
        parent_turn_id: row.try_get("parent_turn_id")?,
        question_number: row.try_get::<i32, _>("question_number")? as usize,
        agent_action: row.try_get("agent_action")?,
        reasoning_trace: row.try_get("reasoning_trace")?,
        created_at: row.try_get("created_at")?,
    })
}

const SESSION_COLUMNS: &str =
    "id, candidate_id, role_id, cv_id, plan, state, settings, turn_count, started_at, ended_at";

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn create_session(&self, session: &InterviewSession) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO interview_sessions \
             (id, candidate_id, role_id, cv_id, plan, state, settings, turn_count, \
              started_at, ended_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(session.id)
        .bind(session.candidate_id)
        .bind(session.role_id)
        .bind(session.cv_id)
        .bind(to_json(&session.plan, "plan")?)
        .bind(to_json(&session.state, "state")?)
        .bind(to_json(&session.settings, "settings")?)
        .bind(session.turn_count as i32)
        .bind(session.started_at)
        .bind(session.ended_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_session(&self, id: Uuid) -> Result<Option<InterviewSession>, AppError> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM interview_sessions WHERE id = $1");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(map_session).transpose()
    }

    async fn save_session(&self, session: &InterviewSession) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE interview_sessions \
             SET plan = $2, state = $3, settings = $4, turn_count = $5, ended_at = $6 \
             WHERE id = $1",
        )
        .bind(session.id)
        .bind(to_json(&session.plan, "plan")?)
        .bind(to_json(&session.state, "state")?)
        .bind(to_json(&session.settings, "settings")?)
        .bind(session.turn_count as i32)
        .bind(session.ended_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn commit_turn(
        &self,
        session: &InterviewSession,
        turn: &InterviewTurn,
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO interview_turns \
             (id, session_id, turn_index, question_id, question_snapshot, transcript, code, \
              score, is_followup, parent_turn_id, question_number, agent_action, \
              reasoning_trace, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
        )
        .bind(turn.id)
        .bind(turn.session_id)
        .bind(turn.turn_index as i32)
        .bind(turn.question_id)
        .bind(&turn.question_snapshot)
        .bind(&turn.transcript)
        .bind(&turn.code)
        .bind(to_json(&turn.score, "score")?)
        .bind(turn.is_followup)
        .bind(turn.parent_turn_id)
        .bind(turn.question_number as i32)
        .bind(&turn.agent_action)
        .bind(&turn.reasoning_trace)
        .bind(turn.created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE interview_sessions \
             SET plan = $2, state = $3, settings = $4, turn_count = $5, ended_at = $6 \
             WHERE id = $1",
        )
        .bind(session.id)
        .bind(to_json(&session.plan, "plan")?)
        .bind(to_json(&session.state, "state")?)
        .bind(to_json(&session.settings, "settings")?)
        .bind(session.turn_count as i32)
        .bind(session.ended_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn list_turns(&self, session_id: Uuid) -> Result<Vec<InterviewTurn>, AppError> {
        let rows = sqlx::query(
            "SELECT id, session_id, turn_index, question_id, question_snapshot, transcript, \
             code, score, is_followup, parent_turn_id, question_number, agent_action, \
             reasoning_trace, created_at \
             FROM interview_turns WHERE session_id = $1 ORDER BY turn_index",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(map_turn).collect()
    }
}

pub struct PgRoleProfileStore {
    pool: PgPool,
}

impl PgRoleProfileStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RoleProfileStore for PgRoleProfileStore {
    async fn get_profile(&self, role_id: Uuid) -> Result<Option<RoleProfile>, AppError> {
        let row = sqlx::query(
            "SELECT role_id, title, experience_level, must_have_topics, \
             nice_to_have_topics, topic_weights \
             FROM role_profiles WHERE role_id = $1",
        )
        .bind(role_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let must_have: Value = row.try_get("must_have_topics")?;
        let nice_to_have: Value = row.try_get("nice_to_have_topics")?;
        let weights: Value = row.try_get("topic_weights")?;
        Ok(Some(RoleProfile {
            role_id: row.try_get("role_id")?,
            title: row.try_get("title")?,
            experience_level: row.try_get("experience_level")?,
            must_have_topics: from_json(must_have, "must_have_topics")?,
            nice_to_have_topics: from_json(nice_to_have, "nice_to_have_topics")?,
            topic_weights: from_json::<HashMap<String, f64>>(weights, "topic_weights")?,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_question_types_and_difficulties() {
        assert_eq!(parse_question_type("open").unwrap(), QuestionType::Open);
        assert_eq!(parse_question_type("code").unwrap(), QuestionType::Code);
        assert!(parse_question_type("riddle").is_err());

        assert_eq!(parse_difficulty(None).unwrap(), None);
        assert_eq!(
            parse_difficulty(Some("medium")).unwrap(),
            Some(Difficulty::Medium)
        );
        assert!(parse_difficulty(Some("impossible")).is_err());
    }
}

//! In-memory store implementations, used by tests and local demos.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::question::{Question, QuestionType};
use crate::models::role::RoleProfile;
use crate::models::session::{InterviewSession, InterviewTurn};

use super::{QuestionStore, RoleProfileStore, SessionStore};

#[derive(Debug, Clone)]
struct AskedEntry {
    candidate_id: Uuid,
    role_id: Uuid,
    session_id: Uuid,
    question_id: Uuid,
    asked_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct InMemoryQuestionStore {
    questions: RwLock<HashMap<Uuid, Question>>,
    history: RwLock<Vec<AskedEntry>>,
}

impl InMemoryQuestionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_questions(questions: Vec<Question>) -> Self {
        let map = questions.into_iter().map(|q| (q.id, q)).collect();
        InMemoryQuestionStore {
            questions: RwLock::new(map),
            history: RwLock::new(Vec::new()),
        }
    }

    pub fn insert_question(&self, question: Question) {
        self.questions.write().unwrap().insert(question.id, question);
    }

    /// Backdates a history row, for recency-window tests.
    pub fn record_asked_at(
        &self,
        candidate_id: Uuid,
        role_id: Uuid,
        session_id: Uuid,
        question_id: Uuid,
        asked_at: DateTime<Utc>,
    ) {
        self.history.write().unwrap().push(AskedEntry {
            candidate_id,
            role_id,
            session_id,
            question_id,
            asked_at,
        });
    }
}

#[async_trait]
impl QuestionStore for InMemoryQuestionStore {
    async fn get_question(&self, id: Uuid) -> Result<Option<Question>, AppError> {
        Ok(self.questions.read().unwrap().get(&id).cloned())
    }

    async fn list_questions(
        &self,
        question_type: QuestionType,
    ) -> Result<Vec<Question>, AppError> {
        let mut questions: Vec<Question> = self
            .questions
            .read()
            .unwrap()
            .values()
            .filter(|q| q.question_type == question_type)
            .cloned()
            .collect();
        // deterministic order for tests
        questions.sort_by_key(|q| q.id);
        Ok(questions)
    }

    async fn record_asked(
        &self,
        candidate_id: Uuid,
        role_id: Uuid,
        session_id: Uuid,
        question_id: Uuid,
    ) -> Result<(), AppError> {
        self.record_asked_at(candidate_id, role_id, session_id, question_id, Utc::now());
        Ok(())
    }

    async fn recently_asked(
        &self,
        candidate_id: Uuid,
        role_id: Uuid,
        since: DateTime<Utc>,
        max_sessions: usize,
    ) -> Result<HashSet<Uuid>, AppError> {
        let history = self.history.read().unwrap();
        let relevant: Vec<&AskedEntry> = history
            .iter()
            .filter(|e| {
                e.candidate_id == candidate_id && e.role_id == role_id && e.asked_at >= since
            })
            .collect();

        // most recent sessions first
        let mut sessions: Vec<(Uuid, DateTime<Utc>)> = Vec::new();
        for entry in &relevant {
            match sessions.iter_mut().find(|(id, _)| *id == entry.session_id) {
                Some((_, latest)) => {
                    if entry.asked_at > *latest {
                        *latest = entry.asked_at;
                    }
                }
                None => sessions.push((entry.session_id, entry.asked_at)),
            }
        }
        sessions.sort_by(|a, b| b.1.cmp(&a.1));
        let window: HashSet<Uuid> = sessions
            .into_iter()
            .take(max_sessions)
            .map(|(id, _)| id)
            .collect();

        Ok(relevant
            .into_iter()
            .filter(|e| window.contains(&e.session_id))
            .map(|e| e.question_id)
            .collect())
    }
}

#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<Uuid, InterviewSession>>,
    turns: RwLock<Vec<InterviewTurn>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create_session(&self, session: &InterviewSession) -> Result<(), AppError> {
        self.sessions
            .write()
            .unwrap()
            .insert(session.id, session.clone());
        Ok(())
    }

    async fn load_session(&self, id: Uuid) -> Result<Option<InterviewSession>, AppError> {
        Ok(self.sessions.read().unwrap().get(&id).cloned())
    }

    async fn save_session(&self, session: &InterviewSession) -> Result<(), AppError> {
        self.sessions
            .write()
            .unwrap()
            .insert(session.id, session.clone());
        Ok(())
    }

    async fn commit_turn(
        &self,
        session: &InterviewSession,
        turn: &InterviewTurn,
    ) -> Result<(), AppError> {
        // both writes under the sessions lock so readers never see one
        // without the other
        let mut sessions = self.sessions.write().unwrap();
        let mut turns = self.turns.write().unwrap();
        turns.push(turn.clone());
        sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn list_turns(&self, session_id: Uuid) -> Result<Vec<InterviewTurn>, AppError> {
        let mut turns: Vec<InterviewTurn> = self
            .turns
            .read()
            .unwrap()
            .iter()
            .filter(|t| t.session_id == session_id)
            .cloned()
            .collect();
        turns.sort_by_key(|t| t.turn_index);
        Ok(turns)
    }
}

#[derive(Default)]
pub struct InMemoryRoleProfileStore {
    profiles: RwLock<HashMap<Uuid, RoleProfile>>,
}

impl InMemoryRoleProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_profile(&self, profile: RoleProfile) {
        self.profiles
            .write()
            .unwrap()
            .insert(profile.role_id, profile);
    }
}

#[async_trait]
impl RoleProfileStore for InMemoryRoleProfileStore {
    async fn get_profile(&self, role_id: Uuid) -> Result<Option<RoleProfile>, AppError> {
        Ok(self.profiles.read().unwrap().get(&role_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn make_question(question_type: QuestionType) -> Question {
        Question {
            id: Uuid::new_v4(),
            question_type,
            difficulty: None,
            text: "Tell me about ownership.".to_string(),
            topics: vec!["rust".to_string()],
            reference_solution: None,
        }
    }

    #[tokio::test]
    async fn recency_window_is_time_bounded() {
        let store = InMemoryQuestionStore::new();
        let candidate = Uuid::new_v4();
        let role = Uuid::new_v4();
        let old_q = Uuid::new_v4();
        let new_q = Uuid::new_v4();

        store.record_asked_at(
            candidate,
            role,
            Uuid::new_v4(),
            old_q,
            Utc::now() - Duration::days(30),
        );
        store.record_asked_at(candidate, role, Uuid::new_v4(), new_q, Utc::now());

        let recent = store
            .recently_asked(candidate, role, Utc::now() - Duration::days(7), 3)
            .await
            .unwrap();
        assert!(recent.contains(&new_q));
        assert!(!recent.contains(&old_q));
    }

    #[tokio::test]
    async fn recency_window_is_session_bounded() {
        let store = InMemoryQuestionStore::new();
        let candidate = Uuid::new_v4();
        let role = Uuid::new_v4();

        // four sessions, oldest first
        let mut question_ids = Vec::new();
        for hours_ago in [4i64, 3, 2, 1] {
            let q = Uuid::new_v4();
            store.record_asked_at(
                candidate,
                role,
                Uuid::new_v4(),
                q,
                Utc::now() - Duration::hours(hours_ago),
            );
            question_ids.push(q);
        }

        let recent = store
            .recently_asked(candidate, role, Utc::now() - Duration::days(7), 3)
            .await
            .unwrap();
        assert_eq!(recent.len(), 3);
        assert!(!recent.contains(&question_ids[0]));
    }

    #[tokio::test]
    async fn list_questions_filters_by_type() {
        let store = InMemoryQuestionStore::with_questions(vec![
            make_question(QuestionType::Open),
            make_question(QuestionType::Code),
        ]);
        store.insert_question(make_question(QuestionType::Open));
        assert_eq!(
            store.list_questions(QuestionType::Open).await.unwrap().len(),
            2
        );
        assert_eq!(
            store.list_questions(QuestionType::Code).await.unwrap().len(),
            1
        );
    }
}

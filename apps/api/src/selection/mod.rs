//! Question selection: weighted, diversity-constrained, history-aware
//! sampling that materializes one `InterviewPlan` per session.

use std::collections::{HashMap, HashSet};

use chrono::{Duration, Utc};
use rand::rngs::StdRng;
use rand::Rng;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::plan::{InterviewPlan, PlanCandidate, PlanItem};
use crate::models::question::{Difficulty, Question, QuestionType};
use crate::models::role::RoleProfile;
use crate::models::session::InterviewSettings;
use crate::store::QuestionStore;

/// Knobs for plan construction. Defaults mirror production behavior.
#[derive(Debug, Clone)]
pub struct SelectionConfig {
    /// Questions asked within this many days are excluded.
    pub recency_days: i64,
    /// At most this many recent sessions count toward exclusion.
    pub recency_sessions: usize,
    /// Maximum allowed topic-set Jaccard similarity between open questions.
    pub diversity_ceiling: f64,
    /// Top-K sampling pool size as a multiple of the requested count.
    pub pool_multiplier: usize,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        SelectionConfig {
            recency_days: 7,
            recency_sessions: 3,
            diversity_ceiling: 0.7,
            pool_multiplier: 3,
        }
    }
}

/// Topic-overlap score in [0,1]: exact topic match earns the full weight,
/// substring match half, normalized by the question's topic count. Questions
/// or profiles without topics score a neutral 0.5.
pub fn match_score(question: &Question, weights: &HashMap<String, f64>) -> f64 {
    let topics = question.topic_set();
    if topics.is_empty() || weights.is_empty() {
        return 0.5;
    }
    let mut total = 0.0;
    for topic in &topics {
        if let Some(w) = weights.get(topic) {
            total += w;
        } else if let Some((_, w)) = weights
            .iter()
            .find(|(k, _)| topic.contains(k.as_str()) || k.contains(topic.as_str()))
        {
            total += w * 0.5;
        }
    }
    (total / topics.len() as f64).clamp(0.0, 1.0)
}

/// Style multiplier from the 0-100 technical/personal slider. Open questions
/// interpolate 0.5 at fully technical to 1.5 at fully personal; code
/// questions run the other way. Floored so neither category is excluded.
pub fn style_multiplier(question_type: QuestionType, slider: u8) -> f64 {
    let s = f64::from(slider.min(100)) / 100.0;
    let raw = match question_type {
        QuestionType::Open => 0.5 + s,
        QuestionType::Code => 1.5 - s,
    };
    raw.max(0.1)
}

/// Jaccard similarity of two topic sets. Empty sets are maximally dissimilar.
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// One weighted draw over the pool with weight = score². A non-positive
/// weight sum degenerates to a uniform draw.
fn weighted_pick(pool: &[(Question, f64)], rng: &mut StdRng) -> Option<usize> {
    if pool.is_empty() {
        return None;
    }
    let total: f64 = pool.iter().map(|(_, s)| s * s).sum();
    if total <= 0.0 {
        return Some(rng.gen_range(0..pool.len()));
    }
    let mut target = rng.gen_range(0.0..total);
    for (i, (_, score)) in pool.iter().enumerate() {
        target -= score * score;
        if target <= 0.0 {
            return Some(i);
        }
    }
    Some(pool.len() - 1)
}

/// Weighted-without-replacement sampling over the top-K scored open
/// questions, rejecting picks too topically similar to earlier picks.
pub fn select_open_questions(
    mut pool: Vec<(Question, f64)>,
    count: usize,
    diversity_ceiling: f64,
    pool_multiplier: usize,
    rng: &mut StdRng,
) -> Vec<(Question, f64)> {
    pool.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    pool.truncate(count.saturating_mul(pool_multiplier).max(count));

    let mut selected: Vec<(Question, f64)> = Vec::new();
    let mut selected_topics: Vec<HashSet<String>> = Vec::new();

    while selected.len() < count && !pool.is_empty() {
        let Some(idx) = weighted_pick(&pool, rng) else {
            break;
        };
        let (question, score) = pool.remove(idx);
        let topics = question.topic_set();
        let too_similar = selected_topics
            .iter()
            .any(|t| jaccard(t, &topics) > diversity_ceiling);
        if too_similar {
            // rejected pick stays out of the pool; retry until exhaustion
            continue;
        }
        selected_topics.push(topics);
        selected.push((question, score));
    }
    selected
}

fn tier_of(question: &Question) -> Difficulty {
    question.difficulty.unwrap_or(Difficulty::Medium)
}

/// Builds the alternate list for one code slot: the best-scored unused
/// question per difficulty tier present, sorted easiest to hardest. The slot
/// starts on the easiest alternate.
fn build_code_slot(
    pool: &[(Question, f64)],
    used: &mut HashSet<Uuid>,
) -> Option<Vec<PlanCandidate>> {
    let mut per_tier: HashMap<Difficulty, &(Question, f64)> = HashMap::new();
    for entry in pool {
        if used.contains(&entry.0.id) {
            continue;
        }
        let tier = tier_of(&entry.0);
        match per_tier.get(&tier) {
            Some(best) if best.1 >= entry.1 => {}
            _ => {
                per_tier.insert(tier, entry);
            }
        }
    }
    if per_tier.is_empty() {
        return None;
    }
    let mut alternates: Vec<PlanCandidate> = per_tier
        .into_values()
        .map(|(q, score)| PlanCandidate {
            question_id: q.id,
            difficulty: Some(tier_of(q)),
            topics: q.topics.clone(),
            score: *score,
        })
        .collect();
    alternates.sort_by_key(|c| c.difficulty.map(|d| d.rank()).unwrap_or(1));
    for alt in &alternates {
        used.insert(alt.question_id);
    }
    Some(alternates)
}

/// Swaps a not-yet-presented code slot to an easier or harder alternate
/// based on the candidate's most recent score.
pub fn adapt_slot_difficulty(item: &mut PlanItem, last_score: f64) -> bool {
    if item.question_type != QuestionType::Code {
        return false;
    }
    if last_score < 0.6 {
        let swapped = item.swap_easier();
        if swapped {
            info!(slot = item.slot, last_score, "swapped code slot easier");
        }
        swapped
    } else if last_score > 0.85 {
        let swapped = item.swap_harder();
        if swapped {
            info!(slot = item.slot, last_score, "swapped code slot harder");
        }
        swapped
    } else {
        false
    }
}

pub struct PlanRequest<'a> {
    pub candidate_id: Uuid,
    pub role_id: Uuid,
    pub profile: &'a RoleProfile,
    pub settings: &'a InterviewSettings,
}

async fn scored_pool(
    store: &dyn QuestionStore,
    question_type: QuestionType,
    excluded: &HashSet<Uuid>,
    weights: &HashMap<String, f64>,
    slider: u8,
) -> Result<Vec<(Question, f64)>, AppError> {
    let all = store.list_questions(question_type).await?;
    let mut filtered: Vec<Question> = all
        .iter()
        .filter(|q| !excluded.contains(&q.id))
        .cloned()
        .collect();
    if filtered.is_empty() && !all.is_empty() {
        warn!(
            ?question_type,
            "recency exclusion emptied the pool, falling back to full pool"
        );
        filtered = all;
    }
    let multiplier = style_multiplier(question_type, slider);
    Ok(filtered
        .into_iter()
        .map(|q| {
            let score = match_score(&q, weights) * multiplier;
            (q, score)
        })
        .collect())
}

/// Materializes the interview plan: open slots first, then code slots.
/// An empty plan is a fatal configuration error, never retried.
pub async fn build_plan(
    store: &dyn QuestionStore,
    config: &SelectionConfig,
    request: &PlanRequest<'_>,
    rng: &mut StdRng,
) -> Result<InterviewPlan, AppError> {
    let since = Utc::now() - Duration::days(config.recency_days);
    let excluded = store
        .recently_asked(
            request.candidate_id,
            request.role_id,
            since,
            config.recency_sessions,
        )
        .await?;
    let weights = request.profile.effective_weights();
    let slider = request.settings.style_slider;

    let mut items: Vec<PlanItem> = Vec::new();

    let open_pool =
        scored_pool(store, QuestionType::Open, &excluded, &weights, slider).await?;
    let open = select_open_questions(
        open_pool,
        request.settings.num_open,
        config.diversity_ceiling,
        config.pool_multiplier,
        rng,
    );
    for (question, score) in open {
        items.push(PlanItem {
            slot: items.len(),
            question_type: QuestionType::Open,
            selected_question_id: question.id,
            candidates: vec![PlanCandidate {
                question_id: question.id,
                difficulty: question.difficulty,
                topics: question.topics,
                score,
            }],
            presented: false,
        });
    }

    let code_pool =
        scored_pool(store, QuestionType::Code, &excluded, &weights, slider).await?;
    let mut used: HashSet<Uuid> = HashSet::new();
    for _ in 0..request.settings.num_code {
        let Some(alternates) = build_code_slot(&code_pool, &mut used) else {
            break;
        };
        items.push(PlanItem {
            slot: items.len(),
            question_type: QuestionType::Code,
            selected_question_id: alternates[0].question_id,
            candidates: alternates,
            presented: false,
        });
    }

    if items.is_empty() {
        return Err(AppError::Config(
            "question pool produced an empty interview plan".to_string(),
        ));
    }

    info!(
        total = items.len(),
        open = request.settings.num_open,
        code = request.settings.num_code,
        "interview plan built"
    );
    Ok(InterviewPlan { items })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn make_question(topics: &[&str]) -> Question {
        Question {
            id: Uuid::new_v4(),
            question_type: QuestionType::Open,
            difficulty: None,
            text: format!("Tell me about {}.", topics.join(", ")),
            topics: topics.iter().map(|t| t.to_string()).collect(),
            reference_solution: None,
        }
    }

    fn make_code_question(difficulty: Difficulty, topics: &[&str]) -> Question {
        Question {
            id: Uuid::new_v4(),
            question_type: QuestionType::Code,
            difficulty: Some(difficulty),
            text: "Implement it.".to_string(),
            topics: topics.iter().map(|t| t.to_string()).collect(),
            reference_solution: Some("fn solve() {}".to_string()),
        }
    }

    fn weights(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn match_score_full_for_exact_half_for_substring() {
        let w = weights(&[("rust", 1.0), ("databases", 0.8)]);

        let exact = make_question(&["rust"]);
        assert!((match_score(&exact, &w) - 1.0).abs() < 1e-9);

        // "database" is a substring of the weighted "databases"
        let partial = make_question(&["database"]);
        assert!((match_score(&partial, &w) - 0.4).abs() < 1e-9);
    }

    #[test]
    fn match_score_normalizes_by_topic_count() {
        let w = weights(&[("rust", 1.0)]);
        let q = make_question(&["rust", "embedded"]);
        assert!((match_score(&q, &w) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn match_score_neutral_without_topics_or_weights() {
        let q = make_question(&[]);
        assert_eq!(match_score(&q, &weights(&[("rust", 1.0)])), 0.5);
        let q2 = make_question(&["rust"]);
        assert_eq!(match_score(&q2, &HashMap::new()), 0.5);
    }

    #[test]
    fn style_multiplier_interpolates_and_floors() {
        assert!((style_multiplier(QuestionType::Open, 0) - 0.5).abs() < 1e-9);
        assert!((style_multiplier(QuestionType::Open, 100) - 1.5).abs() < 1e-9);
        assert!((style_multiplier(QuestionType::Code, 0) - 1.5).abs() < 1e-9);
        assert!((style_multiplier(QuestionType::Code, 100) - 0.5).abs() < 1e-9);
        assert!(style_multiplier(QuestionType::Code, 50) > 0.1);
    }

    #[test]
    fn jaccard_basic_cases() {
        let a: HashSet<String> = ["sql", "indexes"].iter().map(|s| s.to_string()).collect();
        let b: HashSet<String> = ["sql", "sharding"].iter().map(|s| s.to_string()).collect();
        assert!((jaccard(&a, &b) - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(jaccard(&HashSet::new(), &HashSet::new()), 0.0);
        assert!((jaccard(&a, &a) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn open_selection_respects_diversity_ceiling() {
        // two near-identical questions plus distinct alternatives
        let pool = vec![
            (make_question(&["sql", "indexes", "postgres"]), 0.9),
            (make_question(&["sql", "indexes", "postgres"]), 0.9),
            (make_question(&["concurrency", "threads"]), 0.7),
            (make_question(&["networking", "tcp"]), 0.6),
        ];
        let mut rng = StdRng::seed_from_u64(7);
        let selected = select_open_questions(pool, 3, 0.7, 3, &mut rng);
        assert_eq!(selected.len(), 3);
        for i in 0..selected.len() {
            for j in (i + 1)..selected.len() {
                let sim = jaccard(&selected[i].0.topic_set(), &selected[j].0.topic_set());
                assert!(sim <= 0.7, "selected pair too similar: {sim}");
            }
        }
    }

    #[test]
    fn open_selection_is_deterministic_under_a_seed() {
        let pool: Vec<(Question, f64)> = (0..10)
            .map(|i| (make_question(&[&format!("topic-{i}")]), 0.5 + i as f64 / 20.0))
            .collect();
        let pick = |seed: u64| {
            let mut rng = StdRng::seed_from_u64(seed);
            select_open_questions(pool.clone(), 4, 0.7, 3, &mut rng)
                .into_iter()
                .map(|(q, _)| q.id)
                .collect::<Vec<_>>()
        };
        assert_eq!(pick(42), pick(42));
    }

    #[test]
    fn code_slot_picks_one_alternate_per_tier_sorted() {
        let pool = vec![
            (make_code_question(Difficulty::Hard, &["graphs"]), 0.9),
            (make_code_question(Difficulty::Easy, &["arrays"]), 0.8),
            (make_code_question(Difficulty::Medium, &["strings"]), 0.7),
            (make_code_question(Difficulty::Easy, &["arrays"]), 0.4),
        ];
        let mut used = HashSet::new();
        let alternates = build_code_slot(&pool, &mut used).unwrap();
        assert_eq!(alternates.len(), 3);
        assert_eq!(alternates[0].difficulty, Some(Difficulty::Easy));
        assert_eq!(alternates[2].difficulty, Some(Difficulty::Hard));
        // best-scored easy question wins its tier
        assert_eq!(alternates[0].question_id, pool[1].0.id);
    }

    #[test]
    fn adaptive_swap_only_outside_comfort_band() {
        let pool = vec![
            (make_code_question(Difficulty::Easy, &["arrays"]), 0.5),
            (make_code_question(Difficulty::Medium, &["strings"]), 0.5),
            (make_code_question(Difficulty::Hard, &["graphs"]), 0.5),
        ];
        let mut used = HashSet::new();
        let alternates = build_code_slot(&pool, &mut used).unwrap();
        let make_item = || PlanItem {
            slot: 0,
            question_type: QuestionType::Code,
            candidates: alternates.clone(),
            selected_question_id: alternates[0].question_id,
            presented: false,
        };

        let mut item = make_item();
        assert!(adapt_slot_difficulty(&mut item, 0.9));
        assert_eq!(item.selected_question_id, alternates[1].question_id);

        let mut item = make_item();
        assert!(!adapt_slot_difficulty(&mut item, 0.7));

        // already easiest, nothing to swap down to
        let mut item = make_item();
        assert!(!adapt_slot_difficulty(&mut item, 0.3));
    }

    mod plan_building {
        use super::*;
        use crate::store::memory::InMemoryQuestionStore;
        use crate::store::QuestionStore;

        fn make_profile() -> RoleProfile {
            RoleProfile {
                role_id: Uuid::new_v4(),
                title: "Backend Engineer".to_string(),
                experience_level: "senior".to_string(),
                must_have_topics: vec!["rust".to_string(), "sql".to_string()],
                nice_to_have_topics: vec!["kubernetes".to_string()],
                topic_weights: HashMap::new(),
            }
        }

        fn seeded_store() -> InMemoryQuestionStore {
            let mut questions = vec![
                make_question(&["rust", "ownership"]),
                make_question(&["sql", "indexes"]),
                make_question(&["kubernetes", "deployment"]),
                make_question(&["networking", "tcp"]),
                make_question(&["caching", "redis"]),
                make_question(&["testing", "mocks"]),
            ];
            questions.push(make_code_question(Difficulty::Easy, &["arrays"]));
            questions.push(make_code_question(Difficulty::Medium, &["strings"]));
            questions.push(make_code_question(Difficulty::Hard, &["graphs"]));
            InMemoryQuestionStore::with_questions(questions)
        }

        #[tokio::test]
        async fn plan_has_open_then_code_slots() {
            let store = seeded_store();
            let profile = make_profile();
            let settings = InterviewSettings {
                num_open: 2,
                num_code: 1,
                ..Default::default()
            };
            let request = PlanRequest {
                candidate_id: Uuid::new_v4(),
                role_id: profile.role_id,
                profile: &profile,
                settings: &settings,
            };
            let mut rng = StdRng::seed_from_u64(1);
            let plan = build_plan(&store, &SelectionConfig::default(), &request, &mut rng)
                .await
                .unwrap();
            assert_eq!(plan.len(), 3);
            assert_eq!(plan.items[0].question_type, QuestionType::Open);
            assert_eq!(plan.items[2].question_type, QuestionType::Code);
            assert_eq!(plan.first_code_slot(), Some(2));
        }

        #[tokio::test]
        async fn empty_bank_is_a_fatal_config_error() {
            let store = InMemoryQuestionStore::new();
            let profile = make_profile();
            let settings = InterviewSettings::default();
            let request = PlanRequest {
                candidate_id: Uuid::new_v4(),
                role_id: profile.role_id,
                profile: &profile,
                settings: &settings,
            };
            let mut rng = StdRng::seed_from_u64(1);
            let err = build_plan(&store, &SelectionConfig::default(), &request, &mut rng)
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::Config(_)));
        }

        #[tokio::test]
        async fn exclusion_emptied_pool_falls_back_to_full_pool() {
            let store = InMemoryQuestionStore::with_questions(vec![
                make_question(&["rust"]),
                make_question(&["sql"]),
            ]);
            let candidate = Uuid::new_v4();
            let profile = make_profile();
            // every open question was asked yesterday
            for q in store.list_questions(QuestionType::Open).await.unwrap() {
                store
                    .record_asked(candidate, profile.role_id, Uuid::new_v4(), q.id)
                    .await
                    .unwrap();
            }
            let settings = InterviewSettings {
                num_open: 2,
                num_code: 0,
                ..Default::default()
            };
            let request = PlanRequest {
                candidate_id: candidate,
                role_id: profile.role_id,
                profile: &profile,
                settings: &settings,
            };
            let mut rng = StdRng::seed_from_u64(1);
            let plan = build_plan(&store, &SelectionConfig::default(), &request, &mut rng)
                .await
                .unwrap();
            assert_eq!(plan.len(), 2);
        }
    }
}

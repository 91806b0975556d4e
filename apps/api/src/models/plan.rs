use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::question::{Difficulty, QuestionType};

/// A ranked alternative for one plan slot, kept so code slots can be swapped
/// to an easier or harder variant before first presentation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanCandidate {
    pub question_id: Uuid,
    pub difficulty: Option<Difficulty>,
    #[serde(default)]
    pub topics: Vec<String>,
    pub score: f64,
}

/// One slot of the interview plan. `candidates` is sorted easiest to hardest;
/// `selected_question_id` always refers to one of them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanItem {
    pub slot: usize,
    pub question_type: QuestionType,
    pub candidates: Vec<PlanCandidate>,
    pub selected_question_id: Uuid,
    /// Set once the slot has been shown to the candidate. A presented slot is
    /// never re-selected.
    #[serde(default)]
    pub presented: bool,
}

impl PlanItem {
    fn selected_rank(&self) -> Option<usize> {
        self.candidates
            .iter()
            .position(|c| c.question_id == self.selected_question_id)
    }

    /// Swaps the selection to the next easier candidate, if one exists and the
    /// slot has not been presented yet. Returns whether a swap happened.
    pub fn swap_easier(&mut self) -> bool {
        if self.presented {
            return false;
        }
        match self.selected_rank() {
            Some(rank) if rank > 0 => {
                self.selected_question_id = self.candidates[rank - 1].question_id;
                true
            }
            _ => false,
        }
    }

    /// Swaps the selection to the next harder candidate, if one exists and the
    /// slot has not been presented yet. Returns whether a swap happened.
    pub fn swap_harder(&mut self) -> bool {
        if self.presented {
            return false;
        }
        match self.selected_rank() {
            Some(rank) if rank + 1 < self.candidates.len() => {
                self.selected_question_id = self.candidates[rank + 1].question_id;
                true
            }
            _ => false,
        }
    }
}

/// The full ordered plan for one session: open slots first, then code slots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterviewPlan {
    pub items: Vec<PlanItem>,
}

impl InterviewPlan {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn item(&self, slot: usize) -> Option<&PlanItem> {
        self.items.get(slot)
    }

    pub fn item_mut(&mut self, slot: usize) -> Option<&mut PlanItem> {
        self.items.get_mut(slot)
    }

    /// Index of the first code slot, if the plan has one.
    pub fn first_code_slot(&self) -> Option<usize> {
        self.items
            .iter()
            .position(|i| i.question_type == QuestionType::Code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_candidate(difficulty: Difficulty, score: f64) -> PlanCandidate {
        PlanCandidate {
            question_id: Uuid::new_v4(),
            difficulty: Some(difficulty),
            topics: vec!["algorithms".to_string()],
            score,
        }
    }

    fn make_code_item() -> PlanItem {
        let candidates = vec![
            make_candidate(Difficulty::Easy, 0.4),
            make_candidate(Difficulty::Medium, 0.8),
            make_candidate(Difficulty::Hard, 0.6),
        ];
        let selected = candidates[1].question_id;
        PlanItem {
            slot: 0,
            question_type: QuestionType::Code,
            candidates,
            selected_question_id: selected,
            presented: false,
        }
    }

    #[test]
    fn swap_easier_moves_down_one_tier() {
        let mut item = make_code_item();
        assert!(item.swap_easier());
        assert_eq!(item.selected_question_id, item.candidates[0].question_id);
        // already at the easiest tier
        assert!(!item.swap_easier());
    }

    #[test]
    fn swap_harder_moves_up_one_tier() {
        let mut item = make_code_item();
        assert!(item.swap_harder());
        assert_eq!(item.selected_question_id, item.candidates[2].question_id);
        assert!(!item.swap_harder());
    }

    #[test]
    fn presented_slot_is_never_reselected() {
        let mut item = make_code_item();
        item.presented = true;
        let before = item.selected_question_id;
        assert!(!item.swap_easier());
        assert!(!item.swap_harder());
        assert_eq!(item.selected_question_id, before);
    }

    #[test]
    fn first_code_slot_skips_open_items() {
        let open = PlanItem {
            slot: 0,
            question_type: QuestionType::Open,
            candidates: vec![make_candidate(Difficulty::Easy, 1.0)],
            selected_question_id: Uuid::new_v4(),
            presented: false,
        };
        let mut code = make_code_item();
        code.slot = 1;
        let plan = InterviewPlan {
            items: vec![open, code],
        };
        assert_eq!(plan.first_code_slot(), Some(1));
    }
}

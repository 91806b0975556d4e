//! Actions the reasoning backend may select, their JSON schemas, and the
//! executor that turns a validated call into a typed outcome.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;

use crate::llm_client::chain::FallbackChain;
use crate::llm_client::{parse_json, ActionSchema};

use super::context::TurnContext;
use super::guardrails;
use super::prompts;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionName {
    RespondToCandidate,
    AnalyzeAnswer,
    EvaluateCode,
    AskFollowup,
    GiveHint,
    AdvanceToNext,
    EndInterview,
}

impl ActionName {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionName::RespondToCandidate => "respond_to_candidate",
            ActionName::AnalyzeAnswer => "analyze_answer",
            ActionName::EvaluateCode => "evaluate_code",
            ActionName::AskFollowup => "ask_followup",
            ActionName::GiveHint => "give_hint",
            ActionName::AdvanceToNext => "advance_to_next",
            ActionName::EndInterview => "end_interview",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "respond_to_candidate" => Some(ActionName::RespondToCandidate),
            "analyze_answer" => Some(ActionName::AnalyzeAnswer),
            "evaluate_code" => Some(ActionName::EvaluateCode),
            "ask_followup" => Some(ActionName::AskFollowup),
            "give_hint" => Some(ActionName::GiveHint),
            "advance_to_next" => Some(ActionName::AdvanceToNext),
            "end_interview" => Some(ActionName::EndInterview),
            _ => None,
        }
    }

    /// Terminal actions end the reasoning loop for the turn.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ActionName::AskFollowup
                | ActionName::GiveHint
                | ActionName::AdvanceToNext
                | ActionName::EndInterview
        )
    }
}

/// Schemas offered to the backend on every reasoning call.
pub fn action_schemas() -> Vec<ActionSchema> {
    vec![
        ActionSchema {
            name: "respond_to_candidate".to_string(),
            description: "Generate a natural, conversational response to the candidate: \
                          acknowledge their answer, give feedback, or set up a transition."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "response_type": {
                        "type": "string",
                        "enum": ["acknowledge", "transition", "feedback", "clarify"]
                    },
                    "key_points": {
                        "type": "string",
                        "description": "What the candidate said, to reference naturally"
                    },
                    "tone": {
                        "type": "string",
                        "enum": ["encouraging", "neutral", "probing"]
                    }
                },
                "required": ["response_type"]
            }),
        },
        ActionSchema {
            name: "analyze_answer".to_string(),
            description: "Analyze the candidate's answer for completeness, correctness, \
                          and clarity. Returns a score, strengths, gaps, and whether a \
                          follow-up is warranted."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "answer": {"type": "string"},
                    "question": {"type": "string"}
                },
                "required": ["answer"]
            }),
        },
        ActionSchema {
            name: "evaluate_code".to_string(),
            description: "Evaluate submitted code for correctness, efficiency, and style. \
                          Use whenever the candidate provides code."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "code": {"type": "string"},
                    "question": {"type": "string"}
                },
                "required": ["code"]
            }),
        },
        ActionSchema {
            name: "ask_followup".to_string(),
            description: "Ask a follow-up question to clarify, probe deeper, or challenge \
                          the candidate's answer."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "followup_type": {
                        "type": "string",
                        "enum": ["clarify", "probe_deeper", "challenge"]
                    },
                    "target_gap": {
                        "type": "string",
                        "description": "The specific topic or gap to address"
                    }
                },
                "required": ["followup_type"]
            }),
        },
        ActionSchema {
            name: "give_hint".to_string(),
            description: "Provide a hint when the candidate appears stuck. Use sparingly."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "hint_level": {
                        "type": "string",
                        "enum": ["gentle", "moderate", "direct"]
                    },
                    "target_area": {"type": "string"}
                }
            }),
        },
        ActionSchema {
            name: "advance_to_next".to_string(),
            description: "Move to the next question. Use when satisfied with the answer \
                          or the follow-up budget is spent."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "satisfaction_score": {
                        "type": "number",
                        "description": "How satisfied with the answer, 0.0 to 1.0"
                    },
                    "brief_feedback": {"type": "string"}
                }
            }),
        },
        ActionSchema {
            name: "end_interview".to_string(),
            description: "Conclude the interview. Only valid on the final question."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "reason": {
                        "type": "string",
                        "enum": ["completed", "time_up", "candidate_request"]
                    },
                    "closing_message": {"type": "string"}
                }
            }),
        },
    ]
}

fn default_half() -> f64 {
    0.5
}

/// Structured result of `analyze_answer`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerAnalysis {
    #[serde(default = "default_half")]
    pub score: f64,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub gaps: Vec<String>,
    #[serde(default)]
    pub needs_followup: bool,
    #[serde(default)]
    pub summary: String,
}

/// Structured result of `evaluate_code`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeEvaluation {
    #[serde(default = "default_half")]
    pub score: f64,
    #[serde(default = "default_half")]
    pub correctness: f64,
    #[serde(default = "default_half")]
    pub efficiency: f64,
    #[serde(default = "default_half")]
    pub style: f64,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub summary: String,
}

impl CodeEvaluation {
    /// Benefit-of-the-doubt default when the evaluator itself failed: a
    /// working-looking submission scores 0.85, not a neutral 0.5.
    pub fn unevaluated() -> Self {
        CodeEvaluation {
            score: 0.85,
            correctness: 0.85,
            efficiency: 0.85,
            style: 0.85,
            issues: Vec::new(),
            summary: "Evaluation unavailable; scored on benefit of the doubt.".to_string(),
        }
    }

    fn clamped(mut self) -> Self {
        self.score = self.score.clamp(0.0, 1.0);
        self.correctness = self.correctness.clamp(0.0, 1.0);
        self.efficiency = self.efficiency.clamp(0.0, 1.0);
        self.style = self.style.clamp(0.0, 1.0);
        self
    }
}

/// Typed effect of one executed action.
#[derive(Debug, Clone)]
pub enum ActionOutcome {
    Responded { response: String },
    Analyzed(AnswerAnalysis),
    CodeEvaluated(CodeEvaluation),
    FollowupReady { question: String },
    HintReady { hint: String },
    AdvanceRequested { satisfaction_score: f64, feedback: String },
    EndRequested { closing_message: String },
    /// The action ran but produced nothing usable; the loop keeps going.
    Rejected { reason: String },
}

pub struct ActionExecutor<'a> {
    chain: &'a FallbackChain,
}

impl<'a> ActionExecutor<'a> {
    pub fn new(chain: &'a FallbackChain) -> Self {
        Self { chain }
    }

    pub async fn execute(
        &self,
        ctx: &TurnContext,
        name: ActionName,
        args: &Value,
    ) -> ActionOutcome {
        match name {
            ActionName::RespondToCandidate => self.respond(ctx, args).await,
            ActionName::AnalyzeAnswer => self.analyze(ctx).await,
            ActionName::EvaluateCode => self.evaluate_code(ctx).await,
            ActionName::AskFollowup => self.ask_followup(ctx, args).await,
            ActionName::GiveHint => self.give_hint(ctx, args).await,
            ActionName::AdvanceToNext => {
                let score = args
                    .get("satisfaction_score")
                    .and_then(Value::as_f64)
                    .unwrap_or(0.7)
                    .clamp(0.0, 1.0);
                let feedback = args
                    .get("brief_feedback")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                ActionOutcome::AdvanceRequested {
                    satisfaction_score: score,
                    feedback,
                }
            }
            ActionName::EndInterview => {
                let closing = args
                    .get("closing_message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| prompts::closing_message(&ctx.language));
                ActionOutcome::EndRequested {
                    closing_message: closing,
                }
            }
        }
    }

    async fn respond(&self, ctx: &TurnContext, args: &Value) -> ActionOutcome {
        let response_type = args
            .get("response_type")
            .and_then(Value::as_str)
            .unwrap_or("acknowledge");
        let prompt = prompts::respond_prompt(ctx, args);
        match self
            .chain
            .complete(&prompts::respond_system(ctx), &prompt)
            .await
        {
            Ok(text) => ActionOutcome::Responded {
                response: text.trim().to_string(),
            },
            Err(e) => {
                warn!("respond_to_candidate generation failed: {e}");
                ActionOutcome::Responded {
                    response: prompts::canned_response(response_type, ctx),
                }
            }
        }
    }

    async fn analyze(&self, ctx: &TurnContext) -> ActionOutcome {
        let result = self
            .chain
            .complete(prompts::ANALYZE_SYSTEM, &prompts::analyze_prompt(ctx))
            .await
            .and_then(|text| parse_json::<AnswerAnalysis>(&text));
        match result {
            Ok(mut analysis) => {
                analysis.score = analysis.score.clamp(0.0, 1.0);
                ActionOutcome::Analyzed(analysis)
            }
            Err(e) => ActionOutcome::Rejected {
                reason: format!("answer analysis failed: {e}"),
            },
        }
    }

    async fn evaluate_code(&self, ctx: &TurnContext) -> ActionOutcome {
        let Some(code) = ctx.code.as_deref().filter(|c| !c.trim().is_empty()) else {
            return ActionOutcome::Rejected {
                reason: "evaluate_code called without submitted code".to_string(),
            };
        };
        let result = self
            .chain
            .complete(
                prompts::EVALUATE_SYSTEM,
                &prompts::evaluate_prompt(ctx, code),
            )
            .await
            .and_then(|text| parse_json::<CodeEvaluation>(&text));
        match result {
            Ok(evaluation) => ActionOutcome::CodeEvaluated(evaluation.clamped()),
            Err(e) => {
                warn!("code evaluation failed, defaulting generously: {e}");
                ActionOutcome::CodeEvaluated(CodeEvaluation::unevaluated())
            }
        }
    }

    async fn ask_followup(&self, ctx: &TurnContext, args: &Value) -> ActionOutcome {
        let followup_type = args
            .get("followup_type")
            .and_then(Value::as_str)
            .unwrap_or("clarify");
        let target_gap = args.get("target_gap").and_then(Value::as_str);
        let result = self
            .chain
            .complete(
                &prompts::followup_system(ctx),
                &prompts::followup_prompt(ctx, followup_type, target_gap),
            )
            .await;
        match result {
            Ok(text) => {
                let question = text.trim().to_string();
                match guardrails::filter_question(&question) {
                    Some(safe) => ActionOutcome::FollowupReady {
                        question: safe.to_string(),
                    },
                    None => ActionOutcome::Rejected {
                        reason: "generated follow-up blocked by content filter".to_string(),
                    },
                }
            }
            Err(e) => ActionOutcome::Rejected {
                reason: format!("follow-up generation failed: {e}"),
            },
        }
    }

    async fn give_hint(&self, ctx: &TurnContext, args: &Value) -> ActionOutcome {
        let hint_level = args
            .get("hint_level")
            .and_then(Value::as_str)
            .unwrap_or("gentle");
        match self
            .chain
            .complete(
                &prompts::hint_system(ctx),
                &prompts::hint_prompt(ctx, hint_level),
            )
            .await
        {
            Ok(text) => ActionOutcome::HintReady {
                hint: text.trim().to_string(),
            },
            Err(e) => ActionOutcome::Rejected {
                reason: format!("hint generation failed: {e}"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_names_round_trip() {
        for name in [
            ActionName::RespondToCandidate,
            ActionName::AnalyzeAnswer,
            ActionName::EvaluateCode,
            ActionName::AskFollowup,
            ActionName::GiveHint,
            ActionName::AdvanceToNext,
            ActionName::EndInterview,
        ] {
            assert_eq!(ActionName::parse(name.as_str()), Some(name));
        }
        assert_eq!(ActionName::parse("make_coffee"), None);
    }

    #[test]
    fn terminal_actions_are_the_four_decisions() {
        assert!(ActionName::AskFollowup.is_terminal());
        assert!(ActionName::GiveHint.is_terminal());
        assert!(ActionName::AdvanceToNext.is_terminal());
        assert!(ActionName::EndInterview.is_terminal());
        assert!(!ActionName::AnalyzeAnswer.is_terminal());
        assert!(!ActionName::RespondToCandidate.is_terminal());
    }

    #[test]
    fn schemas_cover_every_action() {
        let schemas = action_schemas();
        assert_eq!(schemas.len(), 7);
        for schema in &schemas {
            assert!(ActionName::parse(&schema.name).is_some());
            assert!(schema.parameters.get("type").is_some());
        }
    }

    #[test]
    fn analysis_parses_with_partial_fields() {
        let analysis: AnswerAnalysis =
            serde_json::from_str("{\"score\": 0.9, \"strengths\": [\"clear\"]}").unwrap();
        assert!((analysis.score - 0.9).abs() < 1e-9);
        assert!(!analysis.needs_followup);
        assert!(analysis.gaps.is_empty());
    }

    #[test]
    fn unevaluated_code_scores_generously() {
        let eval = CodeEvaluation::unevaluated();
        assert!((eval.score - 0.85).abs() < 1e-9);
    }
}

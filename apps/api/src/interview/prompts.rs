//! Prompt templates and canned candidate-facing text for the interview
//! agent. Templates use `{placeholder}` substitution; the exact wording is
//! deliberately compact since only the input/output contract matters.

use serde_json::Value;

use crate::models::question::QuestionType;
use crate::models::session::Persona;

use super::context::TurnContext;

// ─────────────────────────────────────────────────────────────────────────────
// Persona and language sections
// ─────────────────────────────────────────────────────────────────────────────

pub fn persona_section(persona: Persona) -> &'static str {
    match persona {
        Persona::Friendly => {
            "Interview style: warm and encouraging. Acknowledge effort, keep the \
             candidate at ease, and phrase critique gently."
        }
        Persona::Formal => {
            "Interview style: professional and structured. Stay courteous but \
             concise; avoid small talk."
        }
        Persona::Challenging => {
            "Interview style: rigorous. Press on imprecise claims and ask for \
             specifics, while staying respectful."
        }
    }
}

pub fn language_section(language: &str) -> String {
    if language.eq_ignore_ascii_case("hebrew") {
        "IMPORTANT: Respond only in natural, professional Hebrew. Technical terms \
         may stay in English where that is common usage."
            .to_string()
    } else {
        format!("Respond in {language}.")
    }
}

fn is_hebrew(language: &str) -> bool {
    language.eq_ignore_ascii_case("hebrew")
}

// ─────────────────────────────────────────────────────────────────────────────
// Agent system prompt
// ─────────────────────────────────────────────────────────────────────────────

const AGENT_SYSTEM_TEMPLATE: &str = "\
You are conducting a technical interview for a {role_title} position \
({experience_level} level). Work one question at a time.

{persona}
{language}

Process for each candidate answer:
1. Analyze the answer (analyze_answer) or evaluate submitted code (evaluate_code).
2. Decide: ask one follow-up (ask_followup) if the answer is thin and budget \
remains, give a hint (give_hint) if the candidate is stuck, otherwise advance \
(advance_to_next). Use end_interview only on the final question.
3. Keep candidate-facing text short and natural; never reveal scores or rubrics.

Never ask about protected characteristics (age, religion, family status, \
nationality, health, politics).
{profile}";

pub fn agent_system_prompt(ctx: &TurnContext) -> String {
    AGENT_SYSTEM_TEMPLATE
        .replace("{role_title}", &ctx.role_title)
        .replace("{experience_level}", &ctx.experience_level)
        .replace("{persona}", persona_section(ctx.persona))
        .replace("{language}", &language_section(&ctx.language))
        .replace("{profile}", &ctx.profile_summary())
}

// ─────────────────────────────────────────────────────────────────────────────
// Action prompts
// ─────────────────────────────────────────────────────────────────────────────

pub fn respond_system(ctx: &TurnContext) -> String {
    format!(
        "You write short, natural interviewer remarks. {} {} Output the remark \
         only, no preamble.",
        persona_section(ctx.persona),
        language_section(&ctx.language)
    )
}

pub fn respond_prompt(ctx: &TurnContext, args: &Value) -> String {
    let response_type = args
        .get("response_type")
        .and_then(Value::as_str)
        .unwrap_or("acknowledge");
    let key_points = args
        .get("key_points")
        .and_then(Value::as_str)
        .unwrap_or("their answer");
    format!(
        "Write a one-or-two sentence {response_type} remark referencing {key_points}. \
         The question was: {}",
        ctx.question_text
    )
}

pub const ANALYZE_SYSTEM: &str = "\
You assess interview answers. Return strict JSON:
{\"score\": 0.0-1.0, \"strengths\": [..], \"gaps\": [..], \
\"needs_followup\": bool, \"summary\": \"one sentence\"}
Score against what a candidate at the stated level should know. JSON only.";

pub fn analyze_prompt(ctx: &TurnContext) -> String {
    format!(
        "Question: {}\nExpected level: {}\n\nCandidate's answer:\n{}",
        ctx.question_text, ctx.experience_level, ctx.transcript
    )
}

pub const EVALUATE_SYSTEM: &str = "\
You evaluate interview code submissions. Return strict JSON:
{\"score\": 0.0-1.0, \"correctness\": 0.0-1.0, \"efficiency\": 0.0-1.0, \
\"style\": 0.0-1.0, \"issues\": [..], \"summary\": \"one sentence\"}
Weigh correctness highest. JSON only.";

pub fn evaluate_prompt(ctx: &TurnContext, code: &str) -> String {
    let mut prompt = format!(
        "Problem: {}\n\nCandidate's code:\n```\n{code}\n```",
        ctx.question_text
    );
    if let Some(reference) = ctx.reference_solution.as_deref() {
        prompt.push_str(&format!("\n\nReference solution:\n```\n{reference}\n```"));
    }
    prompt
}

pub fn followup_system(ctx: &TurnContext) -> String {
    format!(
        "You write one concise interview follow-up question. {} {} Output the \
         question only.",
        persona_section(ctx.persona),
        language_section(&ctx.language)
    )
}

pub fn followup_prompt(ctx: &TurnContext, followup_type: &str, target_gap: Option<&str>) -> String {
    let mut prompt = format!(
        "Original question: {}\nCandidate's answer: {}\nFollow-up intent: {followup_type}.",
        ctx.question_text, ctx.transcript
    );
    if let Some(gap) = target_gap {
        prompt.push_str(&format!("\nFocus on: {gap}."));
    }
    if !ctx.previous_followups.is_empty() {
        prompt.push_str("\nDo not repeat these earlier follow-ups:\n");
        for q in &ctx.previous_followups {
            prompt.push_str(&format!("- {q}\n"));
        }
    }
    prompt
}

pub fn hint_system(ctx: &TurnContext) -> String {
    format!(
        "You give a single short hint to a stuck interview candidate without \
         revealing the answer. {} Output the hint only.",
        language_section(&ctx.language)
    )
}

pub fn hint_prompt(ctx: &TurnContext, hint_level: &str) -> String {
    format!(
        "Question: {}\nCandidate's attempt so far: {}\nHint directness: {hint_level}.",
        ctx.question_text, ctx.transcript
    )
}

pub const TRANSITION_SYSTEM: &str = "\
You write a one-sentence interviewer transition into the next question. \
Output the sentence only.";

pub fn transition_prompt(language: &str, next_question: &str) -> String {
    format!(
        "{} Next question: {next_question}",
        language_section(language)
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Question refinement
// ─────────────────────────────────────────────────────────────────────────────

pub const REFINE_SYSTEM: &str = "\
You rephrase bank interview questions so they sound natural when spoken by an \
interviewer, preserving exactly what is being asked. Output the rephrased \
question only.";

pub fn refine_prompt(
    text: &str,
    question_type: QuestionType,
    language: &str,
    persona: Persona,
) -> String {
    let kind = match question_type {
        QuestionType::Open => "open discussion question",
        QuestionType::Code => "coding exercise prompt",
    };
    format!(
        "{} {} Rephrase this {kind}:\n{text}",
        persona_section(persona),
        language_section(language)
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Canned candidate-facing text (deterministic fallbacks)
// ─────────────────────────────────────────────────────────────────────────────

const ACKNOWLEDGEMENTS_EN: &[&str] = &[
    "Got it - let's keep going.",
    "Understood. Let's move to the next topic.",
    "Noted. Here's the next question.",
    "Alright, let's continue.",
];

const ACKNOWLEDGEMENTS_HE: &[&str] = &[
    "הבנתי - בוא נמשיך.",
    "מובן. נעבור לנושא הבא.",
    "רשמתי. הנה השאלה הבאה.",
    "בסדר, נמשיך.",
];

/// Rotating acknowledgement keyed by turn index, so the deterministic path
/// does not repeat itself verbatim.
pub fn acknowledgement_for_turn(turn_index: u32, language: &str) -> String {
    let pool = if is_hebrew(language) {
        ACKNOWLEDGEMENTS_HE
    } else {
        ACKNOWLEDGEMENTS_EN
    };
    pool[turn_index as usize % pool.len()].to_string()
}

pub fn greeting_message(language: &str, role_title: &str) -> String {
    if is_hebrew(language) {
        format!("שלום ותודה שהצטרפת לראיון לתפקיד {role_title}. נתחיל.")
    } else {
        format!(
            "Welcome, and thanks for joining this interview for the {role_title} \
             position. Let's get started."
        )
    }
}

pub fn closing_message(language: &str) -> String {
    if is_hebrew(language) {
        "תודה על זמנך היום. נחזור אליך עם המשך התהליך.".to_string()
    } else {
        "Thank you for your time today. We'll be in touch with next steps.".to_string()
    }
}

pub fn code_received_message(language: &str) -> String {
    if is_hebrew(language) {
        "נראה טוב. בוא נמשיך.".to_string()
    } else {
        "That looks good. Let's continue.".to_string()
    }
}

pub fn code_section_message(language: &str) -> String {
    if is_hebrew(language) {
        "נעבור עכשיו לחלק המעשי. הנה תרגיל קוד.".to_string()
    } else {
        "Let's move to the hands-on part. Here's a coding exercise.".to_string()
    }
}

pub fn fallback_followup_question(language: &str) -> String {
    if is_hebrew(language) {
        "תוכל להרחיב קצת? אשמח לדוגמה קונקרטית.".to_string()
    } else {
        "Could you expand on that a little? A concrete example would help.".to_string()
    }
}

/// Canned `respond_to_candidate` output when generation is unavailable.
pub fn canned_response(response_type: &str, ctx: &TurnContext) -> String {
    if is_hebrew(&ctx.language) {
        return match response_type {
            "clarify" => "תוכל להסביר קצת יותר?".to_string(),
            "transition" => acknowledgement_for_turn(ctx.question_index as u32, &ctx.language),
            _ => "תודה על התשובה.".to_string(),
        };
    }
    match response_type {
        "clarify" => "Could you explain that a bit more?".to_string(),
        "transition" => acknowledgement_for_turn(ctx.question_index as u32, &ctx.language),
        "feedback" => "Thanks, that gives me a good picture.".to_string(),
        _ => "I see, thank you for sharing that.".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interview::context::testing::make_context;

    #[test]
    fn system_prompt_carries_persona_and_role() {
        let mut ctx = make_context("answer");
        ctx.persona = Persona::Challenging;
        let prompt = agent_system_prompt(&ctx);
        assert!(prompt.contains("Backend Engineer"));
        assert!(prompt.contains("rigorous"));
        assert!(prompt.contains("senior"));
    }

    #[test]
    fn hebrew_language_section_switches_canned_text() {
        assert!(language_section("hebrew").contains("Hebrew"));
        assert_ne!(closing_message("hebrew"), closing_message("english"));
    }

    #[test]
    fn acknowledgements_rotate_by_turn_index() {
        let first = acknowledgement_for_turn(0, "english");
        let second = acknowledgement_for_turn(1, "english");
        assert_ne!(first, second);
        // wraps around the pool
        assert_eq!(first, acknowledgement_for_turn(4, "english"));
    }

    #[test]
    fn followup_prompt_lists_previous_followups() {
        let mut ctx = make_context("answer");
        ctx.previous_followups = vec!["What about timeouts?".to_string()];
        let prompt = followup_prompt(&ctx, "probe_deeper", Some("pool sizing"));
        assert!(prompt.contains("What about timeouts?"));
        assert!(prompt.contains("pool sizing"));
    }
}

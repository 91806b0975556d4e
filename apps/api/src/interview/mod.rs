//! The interview orchestration core: per-turn agent context, guardrails,
//! the bounded reasoning loop, the turn recorder, and the public service
//! surface the HTTP layer marshals into.

pub mod actions;
pub mod context;
pub mod guardrails;
pub mod handlers;
pub mod prompts;
pub mod reasoning;
pub mod recorder;
pub mod service;

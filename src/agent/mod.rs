//! Agent module - the generate, execute and verify feedback loop
//!
//! Turns a natural-language intent into a verified step document by asking
//! the generator for steps, running them and asking the verifier whether the
//! run satisfied the intent.

pub mod classifier;
pub mod feedback;
pub mod loop_state;
pub mod prompts;
pub mod response;

pub use classifier::{IntentClass, IntentClassifier, KeywordClassifier};
pub use feedback::{
    merge_documents, AbandonReason, AcceptChoice, FeedbackDecider, FeedbackLoop, LoopOutcome,
    LoopReport, RetryChoice,
};
pub use loop_state::{Attempt, AttemptHistory, Diagnostics, LoopState, LoopTracker, Verdict};
pub use prompts::{GENERATOR_SYSTEM_PROMPT, VERIFIER_SYSTEM_PROMPT};

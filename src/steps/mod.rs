//! Steps module - step documents into actions
//!
//! Parsing, normalization and `${NAME}` substitution.

pub mod action;
pub mod parser;
pub mod substitute;

pub use action::{Action, ParsedDocument};
pub use parser::StepParser;
pub use substitute::{substitute, substitute_value};

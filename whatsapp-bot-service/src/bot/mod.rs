//! The conversational ordering assistant: keyword rules, reply templates, and
//! the state machine that ties them together.

pub mod machine;
pub mod rules;
pub mod templates;

pub use machine::{lookup_for, transition, Lookup, LookupRequest, Transition, TurnContext};
pub use templates::{MessageType, TemplateSet};

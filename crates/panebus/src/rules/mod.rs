//! Coordination rules.
//!
//! One table drives two concerns, disambiguated by `action`: mesh message
//! policy (`auto`/`approve`/`block`) and after-work routing (`next_task`,
//! `handoff`, `spawn`, `notify`, `pipeline`).

mod models;
mod repository;

pub use models::{CreateRule, RuleAction, RuleMatch, RuleRecord};
pub use repository::RuleRepository;

pub mod accumulator;
pub mod config;
pub mod engine;
pub mod error;
pub mod eval;
pub mod export;
pub mod fsm;
pub mod quarantine;
pub mod rules;
pub mod stats;
pub mod store;
pub mod table;

pub use config::EngineConfig;
pub use engine::Engine;
pub use error::EngineError;
pub use fsm::service::{CreateRule, RuleService, RuleView, UpdateRule};
pub use fsm::state::LifecycleState;

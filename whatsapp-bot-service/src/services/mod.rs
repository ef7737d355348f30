//! Services for whatsapp-bot-service.

pub mod database;
pub mod engine;
pub mod memory;
pub mod metrics;
pub mod store;

pub use database::Database;
pub use engine::{ConversationEngine, EngineSettings, InboundMessage, TurnOutcome};
pub use memory::{InMemoryBackend, PlacedOrder};
pub use metrics::{get_metrics, init_metrics};
pub use store::{CatalogRepository, SessionGuard, SessionStore};

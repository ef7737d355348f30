//! Storage seams used by the conversation engine.
//!
//! Two backends implement them: [`Database`](super::Database) on PostgreSQL
//! and [`InMemoryBackend`](super::InMemoryBackend) for local runs and tests.

use crate::bot::TemplateSet;
use crate::models::{ConversationSession, Coupon, MenuItem, NewOrder, Restaurant};
use async_trait::async_trait;
use service_core::error::AppError;
use uuid::Uuid;

/// Read-only restaurant configuration.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// Cheap round-trip used by the readiness probe.
    async fn ping(&self) -> Result<(), AppError>;

    /// Restaurant reachable at `whatsapp_number` (digits only, no scheme or `+`).
    async fn find_restaurant_by_phone(
        &self,
        whatsapp_number: &str,
    ) -> Result<Option<Restaurant>, AppError>;

    /// Every configured reply text of the restaurant.
    async fn load_templates(&self, restaurant_id: Uuid) -> Result<TemplateSet, AppError>;

    /// Available menu item whose name contains `text`, case-insensitively.
    /// Ties resolve like [`best_menu_match`](crate::models::best_menu_match).
    async fn find_menu_item(
        &self,
        restaurant_id: Uuid,
        text: &str,
    ) -> Result<Option<MenuItem>, AppError>;

    /// Active coupon with this code. Unknown and inactive codes are both `None`.
    async fn find_active_coupon(
        &self,
        restaurant_id: Uuid,
        code: &str,
    ) -> Result<Option<Coupon>, AppError>;
}

/// Conversation persistence with per-conversation serialisation.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Loads the session for the pair, creating it in `GREETING` if needed,
    /// and holds its lock until the returned guard is committed or dropped.
    async fn acquire(
        &self,
        customer_phone: &str,
        restaurant_id: Uuid,
    ) -> Result<Box<dyn SessionGuard>, AppError>;
}

/// One unit of work on a locked session.
///
/// Nothing is visible to other turns until [`commit`](SessionGuard::commit);
/// dropping the guard discards the staged session and orders.
#[async_trait]
pub trait SessionGuard: Send {
    fn session(&self) -> &ConversationSession;

    fn session_mut(&mut self) -> &mut ConversationSession;

    /// Same as [`CatalogRepository::find_menu_item`] for the session's
    /// restaurant, answered inside this unit of work. A turn holding the
    /// lock never waits on another connection.
    async fn find_menu_item(&mut self, text: &str) -> Result<Option<MenuItem>, AppError>;

    /// Same as [`CatalogRepository::find_active_coupon`], inside this unit of work.
    async fn find_active_coupon(&mut self, code: &str) -> Result<Option<Coupon>, AppError>;

    /// Stages an order (header and lines) and returns its id.
    async fn create_order(&mut self, order: &NewOrder) -> Result<Uuid, AppError>;

    /// Persists the session and every staged order together.
    async fn commit(self: Box<Self>) -> Result<(), AppError>;
}

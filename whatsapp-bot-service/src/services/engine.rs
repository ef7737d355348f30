//! Runs one conversation turn against the storage backends.

use crate::bot::{lookup_for, transition, Lookup, LookupRequest, Transition, TurnContext};
use crate::models::ConversationState;
use crate::services::metrics::{record_error, record_turn, ORDERS_PLACED};
use crate::services::store::{CatalogRepository, SessionStore};
use chrono::{Duration, Utc};
use service_core::error::AppError;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// A normalised inbound chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Sender, without the transport scheme.
    pub customer_phone: String,
    /// Restaurant number the customer wrote to, without scheme or `+`.
    pub restaurant_phone: String,
    /// Trimmed, lower-case text.
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Base of the public menu site; the link is `{base}/menu/{restaurant_id}`.
    pub menu_base_url: String,
    /// Idle time after which a conversation starts over. `None` never expires.
    pub session_ttl: Option<Duration>,
    pub default_customer_name: String,
}

/// Result of a committed turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub reply: String,
    pub state: ConversationState,
    pub order_id: Option<Uuid>,
}

pub struct ConversationEngine {
    catalog: Arc<dyn CatalogRepository>,
    sessions: Arc<dyn SessionStore>,
    settings: EngineSettings,
}

impl ConversationEngine {
    pub fn new(
        catalog: Arc<dyn CatalogRepository>,
        sessions: Arc<dyn SessionStore>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            catalog,
            sessions,
            settings,
        }
    }

    /// Resolves the restaurant, advances the conversation, and commits the
    /// new session together with any order it produced.
    ///
    /// Nothing is persisted unless the whole turn succeeds.
    #[instrument(skip(self, message), fields(customer = %mask_phone(&message.customer_phone)))]
    pub async fn handle_turn(&self, message: &InboundMessage) -> Result<TurnOutcome, AppError> {
        let mut started_in = "none";
        match self.run_turn(message, &mut started_in).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                record_turn(started_in, "error");
                record_error(e.kind());
                if e.is_client_error() {
                    warn!(error = %e, "Turn rejected");
                } else {
                    error!(error = %e, "Turn failed");
                }
                Err(e)
            }
        }
    }

    /// `started_in` is set as soon as the session is loaded so failed turns
    /// are counted against the state they started in.
    async fn run_turn(
        &self,
        message: &InboundMessage,
        started_in: &mut &'static str,
    ) -> Result<TurnOutcome, AppError> {
        let restaurant = self
            .catalog
            .find_restaurant_by_phone(&message.restaurant_phone)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!(
                    "No restaurant configured for this number"
                ))
            })?;
        let templates = self.catalog.load_templates(restaurant.id).await?;

        let mut guard = self
            .sessions
            .acquire(&message.customer_phone, restaurant.id)
            .await?;

        let now = Utc::now();
        let mut session = guard.session().clone();
        if let Some(ttl) = self.settings.session_ttl {
            if session.is_idle_longer_than(ttl, now) {
                info!(
                    restaurant_id = %restaurant.id,
                    state = %session.state,
                    "Conversation idle past TTL, starting over"
                );
                session.restart();
            }
        }
        *started_in = session.state.metric_label();
        let from_state = *started_in;

        let lookup = match lookup_for(&session.state, &message.text) {
            LookupRequest::None => Lookup::None,
            LookupRequest::MenuItem => {
                Lookup::MenuItem(guard.find_menu_item(&message.text).await?)
            }
            LookupRequest::Coupon => {
                Lookup::Coupon(guard.find_active_coupon(&message.text).await?)
            }
        };

        let menu_url = format!(
            "{}/menu/{}",
            self.settings.menu_base_url.trim_end_matches('/'),
            restaurant.id
        );
        let ctx = TurnContext {
            restaurant: &restaurant,
            templates: &templates,
            menu_url: &menu_url,
            default_customer_name: &self.settings.default_customer_name,
        };

        let Transition {
            reply,
            session: mut next,
            order,
        } = transition(&ctx, &session, &message.text, lookup);
        next.updated_utc = now;

        let order_id = match &order {
            Some(order) => Some(guard.create_order(order).await?),
            None => None,
        };

        let state = next.state.clone();
        *guard.session_mut() = next;
        guard.commit().await?;

        record_turn(from_state, "ok");
        if let (Some(order_id), Some(order)) = (order_id, &order) {
            ORDERS_PLACED.inc();
            info!(
                order_id = %order_id,
                restaurant_id = %restaurant.id,
                total = %order.totals.total,
                lines = order.lines.len(),
                "Order placed"
            );
        }
        info!(
            restaurant_id = %restaurant.id,
            from_state,
            to_state = %state,
            "Turn completed"
        );

        Ok(TurnOutcome {
            reply,
            state,
            order_id,
        })
    }
}

/// Keeps only the last four digits for logs.
pub fn mask_phone(phone: &str) -> String {
    let digits: Vec<char> = phone.chars().filter(char::is_ascii_digit).collect();
    let tail: String = digits[digits.len().saturating_sub(4)..].iter().collect();
    format!("***{}", tail)
}

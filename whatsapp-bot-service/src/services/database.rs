//! PostgreSQL backend for whatsapp-bot-service.

use crate::bot::TemplateSet;
use crate::models::{
    CartLine, ConversationSession, ConversationState, Coupon, MenuItem, NewOrder, Restaurant,
};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::store::{CatalogRepository, SessionGuard, SessionStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use service_core::error::AppError;
use sqlx::postgres::{PgExecutor, PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{FromRow, Postgres, Transaction};
use std::time::Duration;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "whatsapp-bot-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl CatalogRepository for Database {
    async fn ping(&self) -> Result<(), AppError> {
        self.health_check().await
    }

    #[instrument(skip(self))]
    async fn find_restaurant_by_phone(
        &self,
        whatsapp_number: &str,
    ) -> Result<Option<Restaurant>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_restaurant"])
            .start_timer();

        let restaurant = sqlx::query_as::<_, Restaurant>(
            r#"
            SELECT restaurant_id AS id, restaurant_name, whatsapp_number
            FROM restaurant_profiles
            WHERE whatsapp_number = $1
            "#,
        )
        .bind(whatsapp_number)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to find restaurant: {}", e))
        })?;

        timer.observe_duration();

        Ok(restaurant)
    }

    #[instrument(skip(self), fields(restaurant_id = %restaurant_id))]
    async fn load_templates(&self, restaurant_id: Uuid) -> Result<TemplateSet, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["load_templates"])
            .start_timer();

        let rows = sqlx::query_as::<_, (String, String)>(
            r#"
            SELECT message_type, message_text
            FROM whatsapp_responses
            WHERE restaurant_id = $1
            "#,
        )
        .bind(restaurant_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load templates: {}", e)))?;

        timer.observe_duration();

        Ok(TemplateSet::from_rows(rows))
    }

    async fn find_menu_item(
        &self,
        restaurant_id: Uuid,
        text: &str,
    ) -> Result<Option<MenuItem>, AppError> {
        select_menu_item(&self.pool, restaurant_id, text).await
    }

    async fn find_active_coupon(
        &self,
        restaurant_id: Uuid,
        code: &str,
    ) -> Result<Option<Coupon>, AppError> {
        select_active_coupon(&self.pool, restaurant_id, code).await
    }
}

#[instrument(skip(executor, text), fields(restaurant_id = %restaurant_id))]
async fn select_menu_item<'e, E: PgExecutor<'e>>(
    executor: E,
    restaurant_id: Uuid,
    text: &str,
) -> Result<Option<MenuItem>, AppError> {
    let token = text.trim();
    if token.is_empty() {
        return Ok(None);
    }

    let timer = DB_QUERY_DURATION
        .with_label_values(&["find_menu_item"])
        .start_timer();

    let item = sqlx::query_as::<_, MenuItem>(
        r#"
        SELECT menu_item_id AS id, name, price
        FROM menu_items
        WHERE restaurant_id = $1
          AND is_available
          AND name ILIKE '%' || $2 || '%' ESCAPE '\'
        ORDER BY LOWER(name) = LOWER($3) DESC, LENGTH(name), LOWER(name)
        LIMIT 1
        "#,
    )
    .bind(restaurant_id)
    .bind(escape_like(token))
    .bind(token)
    .fetch_optional(executor)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to find menu item: {}", e)))?;

    timer.observe_duration();

    Ok(item)
}

#[instrument(skip(executor, code), fields(restaurant_id = %restaurant_id))]
async fn select_active_coupon<'e, E: PgExecutor<'e>>(
    executor: E,
    restaurant_id: Uuid,
    code: &str,
) -> Result<Option<Coupon>, AppError> {
    let timer = DB_QUERY_DURATION
        .with_label_values(&["find_active_coupon"])
        .start_timer();

    let coupon = sqlx::query_as::<_, Coupon>(
        r#"
        SELECT UPPER(code) AS code, discount_type, discount_value
        FROM coupons
        WHERE restaurant_id = $1 AND UPPER(code) = $2 AND is_active
        "#,
    )
    .bind(restaurant_id)
    .bind(crate::models::normalize_code(code))
    .fetch_optional(executor)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to find coupon: {}", e)))?;

    timer.observe_duration();

    Ok(coupon)
}

/// Stored form of a conversation.
#[derive(Debug, FromRow)]
struct SessionRow {
    conversation_id: Uuid,
    customer_phone: String,
    restaurant_id: Uuid,
    current_state: String,
    cart: Json<Vec<CartLine>>,
    customer_name: Option<String>,
    applied_coupon: Option<Json<Coupon>>,
    updated_utc: DateTime<Utc>,
}

impl From<SessionRow> for ConversationSession {
    fn from(row: SessionRow) -> Self {
        Self {
            id: row.conversation_id,
            customer_phone: row.customer_phone,
            restaurant_id: row.restaurant_id,
            state: ConversationState::parse(&row.current_state),
            cart: row.cart.0,
            customer_name: row.customer_name,
            applied_coupon: row.applied_coupon.map(|c| c.0),
            updated_utc: row.updated_utc,
        }
    }
}

#[async_trait]
impl SessionStore for Database {
    #[instrument(skip(self, customer_phone), fields(restaurant_id = %restaurant_id))]
    async fn acquire(
        &self,
        customer_phone: &str,
        restaurant_id: Uuid,
    ) -> Result<Box<dyn SessionGuard>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["acquire_session"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        sqlx::query(
            r#"
            INSERT INTO whatsapp_conversations (conversation_id, customer_phone, restaurant_id, current_state)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (customer_phone, restaurant_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(customer_phone)
        .bind(restaurant_id)
        .bind(ConversationState::Greeting.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to create conversation: {}", e))
        })?;

        let row = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT conversation_id, customer_phone, restaurant_id, current_state, cart,
                   customer_name, applied_coupon, updated_utc
            FROM whatsapp_conversations
            WHERE customer_phone = $1 AND restaurant_id = $2
            FOR UPDATE
            "#,
        )
        .bind(customer_phone)
        .bind(restaurant_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to lock conversation: {}", e))
        })?;

        timer.observe_duration();

        Ok(Box::new(PgSessionGuard {
            tx,
            session: row.into(),
        }))
    }
}

/// Open transaction holding the conversation row lock.
struct PgSessionGuard {
    tx: Transaction<'static, Postgres>,
    session: ConversationSession,
}

#[async_trait]
impl SessionGuard for PgSessionGuard {
    fn session(&self) -> &ConversationSession {
        &self.session
    }

    fn session_mut(&mut self) -> &mut ConversationSession {
        &mut self.session
    }

    async fn find_menu_item(&mut self, text: &str) -> Result<Option<MenuItem>, AppError> {
        select_menu_item(&mut *self.tx, self.session.restaurant_id, text).await
    }

    async fn find_active_coupon(&mut self, code: &str) -> Result<Option<Coupon>, AppError> {
        select_active_coupon(&mut *self.tx, self.session.restaurant_id, code).await
    }

    #[instrument(skip(self, order), fields(restaurant_id = %order.restaurant_id, lines = order.lines.len()))]
    async fn create_order(&mut self, order: &NewOrder) -> Result<Uuid, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_order"])
            .start_timer();

        let order_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO orders (order_id, restaurant_id, customer_name, customer_phone, subtotal,
                                discount_amount, total_price, coupon_code, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(order_id)
        .bind(order.restaurant_id)
        .bind(&order.customer_name)
        .bind(&order.customer_phone)
        .bind(order.totals.subtotal)
        .bind(order.totals.discount)
        .bind(order.totals.total)
        .bind(&order.coupon_code)
        .bind(order.status.as_str())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to insert order: {}", e)))?;

        for line in &order.lines {
            sqlx::query(
                r#"
                INSERT INTO order_items (order_item_id, order_id, menu_item_id, item_name, quantity, price_per_item)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(order_id)
            .bind(line.menu_item_id)
            .bind(&line.item_name)
            .bind(i32::try_from(line.quantity).map_err(|_| {
                AppError::BadRequest(anyhow::anyhow!("Quantity out of range for {}", line.item_name))
            })?)
            .bind(line.price_per_item)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to insert order item: {}", e))
            })?;
        }

        timer.observe_duration();

        debug!(order_id = %order_id, "Order staged");

        Ok(order_id)
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        let PgSessionGuard { mut tx, session } = *self;

        let timer = DB_QUERY_DURATION
            .with_label_values(&["save_session"])
            .start_timer();

        sqlx::query(
            r#"
            UPDATE whatsapp_conversations
            SET current_state = $2, cart = $3, customer_name = $4, applied_coupon = $5, updated_utc = $6
            WHERE conversation_id = $1
            "#,
        )
        .bind(session.id)
        .bind(session.state.as_str())
        .bind(Json(&session.cart))
        .bind(&session.customer_name)
        .bind(session.applied_coupon.as_ref().map(Json))
        .bind(session.updated_utc)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to save conversation: {}", e))
        })?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();

        Ok(())
    }
}

/// Makes `%`, `_` and `\` literal inside an `ILIKE ... ESCAPE '\'` pattern.
fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

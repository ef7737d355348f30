//! In-process backend with the same locking and unit-of-work semantics as
//! the PostgreSQL one.

use crate::bot::{MessageType, TemplateSet};
use crate::models::{
    normalize_code, best_menu_match, ConversationSession, Coupon, DiscountType, MenuItem,
    NewOrder, Restaurant,
};
use crate::services::store::{CatalogRepository, SessionGuard, SessionStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

type SessionKey = (String, Uuid);
type SessionSlot = Arc<Mutex<Option<ConversationSession>>>;

#[derive(Debug, Clone)]
struct MenuEntry {
    item: MenuItem,
    available: bool,
}

#[derive(Debug, Clone)]
struct CouponEntry {
    coupon: Coupon,
    active: bool,
}

/// An order accepted by a committed turn.
#[derive(Debug, Clone)]
pub struct PlacedOrder {
    pub id: Uuid,
    pub order: NewOrder,
    pub created_utc: DateTime<Utc>,
}

#[derive(Default)]
struct Inner {
    restaurants: DashMap<Uuid, Restaurant>,
    menu: DashMap<Uuid, Vec<MenuEntry>>,
    coupons: DashMap<(Uuid, String), CouponEntry>,
    templates: DashMap<Uuid, TemplateSet>,
    sessions: DashMap<SessionKey, SessionSlot>,
    orders: DashMap<Uuid, PlacedOrder>,
    unavailable: AtomicBool,
    reject_orders: AtomicBool,
}

/// Catalog and session store kept in memory.
#[derive(Clone, Default)]
pub struct InMemoryBackend {
    inner: Arc<Inner>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_restaurant(&self, restaurant_name: &str, whatsapp_number: &str) -> Restaurant {
        let restaurant = Restaurant {
            id: Uuid::new_v4(),
            restaurant_name: restaurant_name.to_string(),
            whatsapp_number: whatsapp_number.to_string(),
        };
        self.inner
            .restaurants
            .insert(restaurant.id, restaurant.clone());
        restaurant
    }

    pub fn add_menu_item(&self, restaurant_id: Uuid, name: &str, price: Decimal) -> MenuItem {
        let item = MenuItem {
            id: Uuid::new_v4(),
            name: name.to_string(),
            price,
        };
        self.inner
            .menu
            .entry(restaurant_id)
            .or_default()
            .push(MenuEntry {
                item: item.clone(),
                available: true,
            });
        item
    }

    /// Hides or shows an item without removing it.
    pub fn set_item_available(&self, restaurant_id: Uuid, item_id: Uuid, available: bool) {
        if let Some(mut entries) = self.inner.menu.get_mut(&restaurant_id) {
            for entry in entries.iter_mut().filter(|e| e.item.id == item_id) {
                entry.available = available;
            }
        }
    }

    pub fn add_coupon(
        &self,
        restaurant_id: Uuid,
        code: &str,
        discount_type: DiscountType,
        discount_value: Decimal,
        active: bool,
    ) -> Coupon {
        let coupon = Coupon {
            code: normalize_code(code),
            discount_type,
            discount_value,
        };
        self.inner.coupons.insert(
            (restaurant_id, coupon.code.clone()),
            CouponEntry {
                coupon: coupon.clone(),
                active,
            },
        );
        coupon
    }

    pub fn set_template(&self, restaurant_id: Uuid, kind: MessageType, text: &str) {
        self.inner
            .templates
            .entry(restaurant_id)
            .or_default()
            .insert(kind, text);
    }

    /// Committed session for the pair, if any turn has completed.
    pub async fn session(
        &self,
        customer_phone: &str,
        restaurant_id: Uuid,
    ) -> Option<ConversationSession> {
        let slot = self
            .inner
            .sessions
            .get(&(customer_phone.to_string(), restaurant_id))
            .map(|entry| entry.value().clone())?;
        let session = slot.lock().await.clone();
        session
    }

    /// Overwrites the stored session, e.g. to resume a conversation mid-flow.
    pub async fn put_session(&self, session: ConversationSession) {
        let slot = self.slot(&session.customer_phone, session.restaurant_id);
        *slot.lock().await = Some(session);
    }

    /// Every committed order, oldest first.
    pub fn orders(&self) -> Vec<PlacedOrder> {
        let mut orders: Vec<PlacedOrder> = self
            .inner
            .orders
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        orders.sort_by_key(|o| o.created_utc);
        orders
    }

    /// Makes every catalog call fail as an unreachable database would.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Makes order creation fail inside the unit of work.
    pub fn reject_orders(&self, reject: bool) {
        self.inner.reject_orders.store(reject, Ordering::SeqCst);
    }

    fn slot(&self, customer_phone: &str, restaurant_id: Uuid) -> SessionSlot {
        self.inner
            .sessions
            .entry((customer_phone.to_string(), restaurant_id))
            .or_default()
            .value()
            .clone()
    }

    fn ensure_available(&self) -> Result<(), AppError> {
        self.inner.ensure_available()
    }
}

impl Inner {
    fn ensure_available(&self) -> Result<(), AppError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::DatabaseError(anyhow::anyhow!(
                "In-memory backend marked unavailable"
            )));
        }
        Ok(())
    }

    fn menu_item(&self, restaurant_id: Uuid, text: &str) -> Result<Option<MenuItem>, AppError> {
        self.ensure_available()?;
        let Some(entries) = self.menu.get(&restaurant_id) else {
            return Ok(None);
        };
        let available = entries.iter().filter(|e| e.available).map(|e| &e.item);
        Ok(best_menu_match(available, text).cloned())
    }

    fn active_coupon(&self, restaurant_id: Uuid, code: &str) -> Result<Option<Coupon>, AppError> {
        self.ensure_available()?;
        Ok(self
            .coupons
            .get(&(restaurant_id, normalize_code(code)))
            .filter(|entry| entry.active)
            .map(|entry| entry.coupon.clone()))
    }
}

#[async_trait]
impl CatalogRepository for InMemoryBackend {
    async fn ping(&self) -> Result<(), AppError> {
        self.ensure_available()
    }

    async fn find_restaurant_by_phone(
        &self,
        whatsapp_number: &str,
    ) -> Result<Option<Restaurant>, AppError> {
        self.ensure_available()?;
        Ok(self
            .inner
            .restaurants
            .iter()
            .find(|entry| entry.whatsapp_number == whatsapp_number)
            .map(|entry| entry.value().clone()))
    }

    async fn load_templates(&self, restaurant_id: Uuid) -> Result<TemplateSet, AppError> {
        self.ensure_available()?;
        Ok(self
            .inner
            .templates
            .get(&restaurant_id)
            .map(|set| set.value().clone())
            .unwrap_or_default())
    }

    async fn find_menu_item(
        &self,
        restaurant_id: Uuid,
        text: &str,
    ) -> Result<Option<MenuItem>, AppError> {
        self.inner.menu_item(restaurant_id, text)
    }

    async fn find_active_coupon(
        &self,
        restaurant_id: Uuid,
        code: &str,
    ) -> Result<Option<Coupon>, AppError> {
        self.inner.active_coupon(restaurant_id, code)
    }
}

#[async_trait]
impl SessionStore for InMemoryBackend {
    async fn acquire(
        &self,
        customer_phone: &str,
        restaurant_id: Uuid,
    ) -> Result<Box<dyn SessionGuard>, AppError> {
        self.ensure_available()?;

        let slot = self.slot(customer_phone, restaurant_id).lock_owned().await;
        let session = (*slot)
            .clone()
            .unwrap_or_else(|| ConversationSession::new(customer_phone, restaurant_id));

        Ok(Box::new(MemorySessionGuard {
            slot,
            session,
            staged_orders: Vec::new(),
            inner: Arc::clone(&self.inner),
        }))
    }
}

struct MemorySessionGuard {
    slot: OwnedMutexGuard<Option<ConversationSession>>,
    session: ConversationSession,
    staged_orders: Vec<PlacedOrder>,
    inner: Arc<Inner>,
}

#[async_trait]
impl SessionGuard for MemorySessionGuard {
    fn session(&self) -> &ConversationSession {
        &self.session
    }

    fn session_mut(&mut self) -> &mut ConversationSession {
        &mut self.session
    }

    async fn find_menu_item(&mut self, text: &str) -> Result<Option<MenuItem>, AppError> {
        self.inner.menu_item(self.session.restaurant_id, text)
    }

    async fn find_active_coupon(&mut self, code: &str) -> Result<Option<Coupon>, AppError> {
        self.inner.active_coupon(self.session.restaurant_id, code)
    }

    async fn create_order(&mut self, order: &NewOrder) -> Result<Uuid, AppError> {
        if self.inner.reject_orders.load(Ordering::SeqCst) {
            return Err(AppError::DatabaseError(anyhow::anyhow!(
                "Failed to insert order: rejected by backend"
            )));
        }

        let id = Uuid::new_v4();
        self.staged_orders.push(PlacedOrder {
            id,
            order: order.clone(),
            created_utc: Utc::now(),
        });
        Ok(id)
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        let MemorySessionGuard {
            mut slot,
            session,
            staged_orders,
            inner,
        } = *self;

        for placed in staged_orders {
            inner.orders.insert(placed.id, placed);
        }
        *slot = Some(session);
        Ok(())
    }
}

//! Restaurant profile and menu catalog models.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Restaurant profile resolved from the number a customer wrote to.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Restaurant {
    pub id: Uuid,
    pub restaurant_name: String,
    /// Stored without the transport scheme or leading `+`.
    pub whatsapp_number: String,
}

/// Orderable menu item.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct MenuItem {
    pub id: Uuid,
    pub name: String,
    pub price: Decimal,
}

/// Picks the item whose name contains `token`, case-insensitively.
///
/// Among several candidates an exact name match wins, then the shortest
/// name, then alphabetical order, so repeated lookups always agree.
pub fn best_menu_match<'a, I>(items: I, token: &str) -> Option<&'a MenuItem>
where
    I: IntoIterator<Item = &'a MenuItem>,
{
    let needle = token.trim().to_lowercase();
    if needle.is_empty() {
        return None;
    }

    items
        .into_iter()
        .filter_map(|item| {
            let name = item.name.to_lowercase();
            name.contains(&needle).then(|| (name != needle, name.chars().count(), name, item))
        })
        .min_by(|a, b| (a.0, a.1, &a.2).cmp(&(b.0, b.1, &b.2)))
        .map(|(_, _, _, item)| item)
}

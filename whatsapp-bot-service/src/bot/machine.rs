//! Conversation state machine.
//!
//! [`transition`] is pure: catalog and coupon lookups are resolved by the
//! caller beforehand (see [`lookup_for`]) and passed in, and the order to
//! place, if any, is returned instead of persisted.

use crate::bot::rules::{self, MainMenuAction};
use crate::bot::templates::{format_brl, MessageType, TemplateSet, Vars};
use crate::models::{
    normalize_code, ConversationSession, ConversationState, Coupon, MenuItem, NewOrder,
    Restaurant,
};

const MENU_LINK_INTRO: &str = "Aqui está o nosso cardápio completo:";
const EMPTY_CART: &str = "Seu carrinho está vazio.";

/// Per-turn, read-only inputs.
#[derive(Debug, Clone, Copy)]
pub struct TurnContext<'a> {
    pub restaurant: &'a Restaurant,
    pub templates: &'a TemplateSet,
    /// Public menu page of this restaurant.
    pub menu_url: &'a str,
    /// Used for `{customer_name}` until the customer has given a name.
    pub default_customer_name: &'a str,
}

/// Backend data a turn needs before it can be computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupRequest {
    None,
    MenuItem,
    Coupon,
}

/// Resolved backend data for a turn.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    None,
    MenuItem(Option<MenuItem>),
    Coupon(Option<Coupon>),
}

/// Outcome of one turn.
#[derive(Debug, Clone)]
pub struct Transition {
    pub reply: String,
    /// Session as it must be stored after the turn.
    pub session: ConversationSession,
    /// Order to persist together with `session`.
    pub order: Option<NewOrder>,
}

/// Which lookup [`transition`] will consult for this state and message.
pub fn lookup_for(state: &ConversationState, message: &str) -> LookupRequest {
    match state {
        ConversationState::Ordering if !rules::contains_any(message, rules::CHECKOUT_KEYWORDS) => {
            LookupRequest::MenuItem
        }
        ConversationState::ApplyingCoupon => LookupRequest::Coupon,
        _ => LookupRequest::None,
    }
}

/// Computes the reply and next session for `message` (trimmed, lower-case).
pub fn transition(
    ctx: &TurnContext<'_>,
    session: &ConversationSession,
    message: &str,
    lookup: Lookup,
) -> Transition {
    let mut next = session.clone();
    let mut order = None;

    let reply = match &session.state {
        ConversationState::Greeting => {
            next.state = ConversationState::MainMenu;
            let vars = base_vars(ctx, &next);
            join(
                render(ctx, MessageType::Greeting, &vars),
                render(ctx, MessageType::MainMenu, &vars),
            )
        }

        ConversationState::MainMenu => {
            let vars = base_vars(ctx, &next);
            match rules::classify(rules::MAIN_MENU_RULES, message) {
                Some(MainMenuAction::ShowMenuLink) => join(
                    format!("{} {}", MENU_LINK_INTRO, ctx.menu_url),
                    render(ctx, MessageType::MainMenu, &vars),
                ),
                Some(MainMenuAction::StartOrder) => {
                    next.state = ConversationState::Ordering;
                    render(ctx, MessageType::OrderPrompt, &vars)
                }
                Some(MainMenuAction::Help) => join(
                    render(ctx, MessageType::Help, &vars),
                    render(ctx, MessageType::MainMenu, &vars),
                ),
                None => join(
                    render(ctx, MessageType::Error, &vars),
                    render(ctx, MessageType::MainMenu, &vars),
                ),
            }
        }

        ConversationState::Ordering => {
            if rules::contains_any(message, rules::CHECKOUT_KEYWORDS) {
                let vars = base_vars(ctx, &next);
                if next.cart.is_empty() {
                    join(
                        EMPTY_CART.to_string(),
                        render(ctx, MessageType::OrderPrompt, &vars),
                    )
                } else {
                    next.state = ConversationState::CheckoutConfirmation;
                    render(ctx, MessageType::CheckoutConfirmation, &vars)
                }
            } else {
                match lookup {
                    Lookup::MenuItem(Some(item)) => {
                        next.add_item(&item);
                        let vars = base_vars(ctx, &next).set("item_name", item.name.clone());
                        join(
                            render(ctx, MessageType::ItemAdded, &vars),
                            render(ctx, MessageType::OrderPrompt, &vars),
                        )
                    }
                    _ => join(
                        format!("Não encontrei \"{}\" no cardápio.", message),
                        render(ctx, MessageType::OrderPrompt, &base_vars(ctx, &next)),
                    ),
                }
            }
        }

        ConversationState::CheckoutConfirmation => {
            let vars = base_vars(ctx, &next);
            if rules::contains_any(message, rules::CONFIRM_KEYWORDS) {
                next.state = ConversationState::ApplyingCoupon;
                render(ctx, MessageType::CouponCodePrompt, &vars)
            } else {
                next.state = ConversationState::GettingName;
                render(ctx, MessageType::CheckoutNamePrompt, &vars)
            }
        }

        ConversationState::ApplyingCoupon => match lookup {
            Lookup::Coupon(Some(coupon)) => {
                let code = coupon.code.clone();
                next.applied_coupon = Some(coupon);
                next.state = ConversationState::GettingName;
                let vars = base_vars(ctx, &next).set("coupon_code", code);
                join(
                    render(ctx, MessageType::CouponApplied, &vars),
                    render(ctx, MessageType::CheckoutNamePrompt, &vars),
                )
            }
            _ => {
                let vars = base_vars(ctx, &next).set("coupon_code", normalize_code(message));
                join(
                    render(ctx, MessageType::CouponInvalid, &vars),
                    render(ctx, MessageType::CouponCodePrompt, &vars),
                )
            }
        },

        ConversationState::GettingName => {
            next.state = ConversationState::MainMenu;
            if next.cart.is_empty() {
                // Nothing left to order, e.g. the cart was emptied by another turn.
                let vars = base_vars(ctx, &next);
                join(
                    EMPTY_CART.to_string(),
                    render(ctx, MessageType::MainMenu, &vars),
                )
            } else {
                let name = capitalize_name(message);
                if !name.is_empty() {
                    next.customer_name = Some(name);
                }
                let customer_name = next
                    .customer_name
                    .clone()
                    .unwrap_or_else(|| ctx.default_customer_name.to_string());

                let vars = base_vars(ctx, &next);
                order = Some(NewOrder::from_session(&next, &customer_name));
                next.clear_order();
                render(ctx, MessageType::OrderFinalized, &vars)
            }
        }

        ConversationState::Unrecognized(_) => {
            next.state = ConversationState::MainMenu;
            render(ctx, MessageType::Error, &base_vars(ctx, &next))
        }
    };

    Transition {
        reply,
        session: next,
        order,
    }
}

/// Upper-cases the first letter of every whitespace-separated word.
pub fn capitalize_name(raw: &str) -> String {
    raw.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn base_vars(ctx: &TurnContext<'_>, session: &ConversationSession) -> Vars {
    Vars::new()
        .set("restaurant_name", ctx.restaurant.restaurant_name.clone())
        .set(
            "customer_name",
            session
                .customer_name
                .clone()
                .unwrap_or_else(|| ctx.default_customer_name.to_string()),
        )
        .set("total_carrinho", format_brl(session.subtotal()))
        .set("final_price", format_brl(session.total()))
}

fn render(ctx: &TurnContext<'_>, kind: MessageType, vars: &Vars) -> String {
    ctx.templates.render(kind, vars)
}

fn join(first: String, second: String) -> String {
    format!("{}\n\n{}", first, second)
}

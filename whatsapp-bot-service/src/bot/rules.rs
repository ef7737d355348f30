//! Keyword tables for classifying free-text messages.
//!
//! Matching is substring-based on the already case-folded message, and rules
//! are evaluated top to bottom. New trigger words belong here, not in the
//! state machine.

/// A set of trigger keywords mapped to an action.
#[derive(Debug, Clone, Copy)]
pub struct Rule<A> {
    pub keywords: &'static [&'static str],
    pub action: A,
}

impl<A> Rule<A> {
    pub fn matches(&self, message: &str) -> bool {
        contains_any(message, self.keywords)
    }
}

/// Main-menu options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MainMenuAction {
    ShowMenuLink,
    StartOrder,
    Help,
}

pub const MAIN_MENU_RULES: &[Rule<MainMenuAction>] = &[
    Rule {
        keywords: &["1", "cardapio", "cardápio", "menu"],
        action: MainMenuAction::ShowMenuLink,
    },
    Rule {
        keywords: &["2", "pedido"],
        action: MainMenuAction::StartOrder,
    },
    Rule {
        keywords: &["ajuda"],
        action: MainMenuAction::Help,
    },
];

/// While ordering: close the cart and go to checkout.
pub const CHECKOUT_KEYWORDS: &[&str] = &["finalizar", "fechar"];

/// At checkout confirmation: the customer has a coupon.
pub const CONFIRM_KEYWORDS: &[&str] = &["sim"];

pub fn contains_any(message: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|keyword| message.contains(keyword))
}

/// First rule whose keywords occur in `message`.
pub fn classify<A: Copy>(rules: &[Rule<A>], message: &str) -> Option<A> {
    rules
        .iter()
        .find(|rule| rule.matches(message))
        .map(|rule| rule.action)
}

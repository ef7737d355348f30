//! Restaurant-customised reply texts and `{variable}` substitution.

use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::{BTreeMap, HashMap};

/// Keys of the reply texts a restaurant can customise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Greeting,
    MainMenu,
    OrderPrompt,
    ItemAdded,
    CheckoutNamePrompt,
    CheckoutConfirmation,
    CouponCodePrompt,
    CouponApplied,
    CouponInvalid,
    OrderFinalized,
    Help,
    Error,
}

impl MessageType {
    pub const ALL: [MessageType; 12] = [
        Self::Greeting,
        Self::MainMenu,
        Self::OrderPrompt,
        Self::ItemAdded,
        Self::CheckoutNamePrompt,
        Self::CheckoutConfirmation,
        Self::CouponCodePrompt,
        Self::CouponApplied,
        Self::CouponInvalid,
        Self::OrderFinalized,
        Self::Help,
        Self::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Greeting => "GREETING",
            Self::MainMenu => "MAIN_MENU",
            Self::OrderPrompt => "ORDER_PROMPT",
            Self::ItemAdded => "ITEM_ADDED",
            Self::CheckoutNamePrompt => "CHECKOUT_NAME_PROMPT",
            Self::CheckoutConfirmation => "CHECKOUT_CONFIRMATION",
            Self::CouponCodePrompt => "COUPON_CODE_PROMPT",
            Self::CouponApplied => "COUPON_APPLIED",
            Self::CouponInvalid => "COUPON_INVALID",
            Self::OrderFinalized => "ORDER_FINALIZED",
            Self::Help => "HELP",
            Self::Error => "ERROR",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == raw.trim())
    }
}

/// Shown instead of a reply text the restaurant never configured, so the gap
/// is visible in the chat transcript.
pub fn placeholder(kind: MessageType) -> String {
    format!("(Mensagem para '{}' não configurada)", kind.as_str())
}

/// Values for `{name}` tokens.
#[derive(Debug, Clone, Default)]
pub struct Vars(BTreeMap<&'static str, String>);

impl Vars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.0.insert(key, value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }
}

/// Replaces every `{key}` that has a value. Unknown tokens stay verbatim and
/// substituted values are never rescanned.
pub fn substitute(text: &str, vars: &Vars) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                let key = &after[..close];
                match vars.get(key) {
                    Some(value) => out.push_str(value),
                    None => {
                        out.push('{');
                        out.push_str(key);
                        out.push('}');
                    }
                }
                rest = &after[close + 1..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// All reply texts configured for one restaurant.
#[derive(Debug, Clone, Default)]
pub struct TemplateSet {
    texts: HashMap<MessageType, String>,
}

impl TemplateSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds from stored `(message_type, message_text)` rows. Unknown types
    /// and blank texts are skipped.
    pub fn from_rows<I, K, V>(rows: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut set = Self::new();
        for (kind, text) in rows {
            if let Some(kind) = MessageType::parse(kind.as_ref()) {
                set.insert(kind, text);
            }
        }
        set
    }

    pub fn insert(&mut self, kind: MessageType, text: impl Into<String>) {
        let text = text.into();
        if text.trim().is_empty() {
            self.texts.remove(&kind);
        } else {
            self.texts.insert(kind, text);
        }
    }

    pub fn with(mut self, kind: MessageType, text: impl Into<String>) -> Self {
        self.insert(kind, text);
        self
    }

    pub fn get(&self, kind: MessageType) -> Option<&str> {
        self.texts.get(&kind).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }

    /// Configured text with variables substituted, or the placeholder.
    pub fn render(&self, kind: MessageType, vars: &Vars) -> String {
        match self.get(kind) {
            Some(text) => substitute(text, vars),
            None => placeholder(kind),
        }
    }
}

/// Brazilian real formatting: `R$ 1234,50`.
pub fn format_brl(amount: Decimal) -> String {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    format!("R$ {:.2}", rounded).replace('.', ",")
}

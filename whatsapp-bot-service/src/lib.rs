//! whatsapp-bot-service: conversational ordering over WhatsApp for
//! restaurant digital menus.

pub mod bot;
pub mod config;
pub mod handlers;
pub mod models;
pub mod services;
pub mod startup;

pub use startup::{build_router, AppState, Application};

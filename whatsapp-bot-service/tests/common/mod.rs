//! Test helper module for whatsapp-bot-service integration tests.
//!
//! Builds the full router over the in-memory backend and seeds one
//! restaurant with a menu, coupons and reply texts.

#![allow(dead_code)]

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use rust_decimal::Decimal;
use std::sync::Once;
use std::time::Duration;
use tower::ServiceExt;
use whatsapp_bot_service::bot::MessageType;
use whatsapp_bot_service::models::{DiscountType, MenuItem, Restaurant};
use whatsapp_bot_service::services::{init_metrics, EngineSettings, InMemoryBackend};
use whatsapp_bot_service::{build_router, AppState};

pub const RESTAURANT_NUMBER: &str = "5521988880000";
pub const CUSTOMER_NUMBER: &str = "+5511977776666";
pub const MENU_BASE_URL: &str = "https://cardapio.example.com";

static TRACING: Once = Once::new();

/// Quiet subscriber; set `RUST_LOG` to see turn logs while debugging.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .init();
    });
}

/// Reply texts the way a restaurant would configure them.
pub const TEMPLATES: &[(MessageType, &str)] = &[
    (MessageType::Greeting, "Olá! Bem-vindo ao {restaurant_name}."),
    (MessageType::MainMenu, "1 - Ver cardápio\n2 - Fazer pedido\nDigite ajuda para ajuda."),
    (MessageType::OrderPrompt, "Digite o nome do item ou finalizar para fechar o pedido."),
    (MessageType::ItemAdded, "{item_name} adicionado! Total: {total_carrinho}"),
    (MessageType::CheckoutConfirmation, "Seu total é {total_carrinho}. Tem cupom? Responda sim ou não."),
    (MessageType::CouponCodePrompt, "Digite o código do cupom."),
    (MessageType::CouponApplied, "Cupom {coupon_code} aplicado! De {total_carrinho} por {final_price}."),
    (MessageType::CouponInvalid, "Cupom {coupon_code} inválido."),
    (MessageType::CheckoutNamePrompt, "Qual o seu nome?"),
    (MessageType::OrderFinalized, "Obrigado, {customer_name}! Pedido de {final_price} confirmado."),
    (MessageType::Help, "Escolha uma opção do menu."),
    (MessageType::Error, "Não entendi."),
];

pub struct TestApp {
    pub router: Router,
    pub backend: InMemoryBackend,
    pub restaurant: Restaurant,
    pub pizza: MenuItem,
    pub refrigerante: MenuItem,
}

impl TestApp {
    /// Seeded application with a generous request timeout.
    pub fn spawn() -> Self {
        Self::spawn_with_ttl(None)
    }

    pub fn spawn_with_ttl(session_ttl: Option<chrono::Duration>) -> Self {
        init_tracing();
        init_metrics();

        let backend = InMemoryBackend::new();
        let restaurant = backend.add_restaurant("Cantina da Nona", RESTAURANT_NUMBER);
        for (kind, text) in TEMPLATES {
            backend.set_template(restaurant.id, *kind, text);
        }

        let pizza = backend.add_menu_item(restaurant.id, "Pizza Margherita", Decimal::new(4500, 2));
        let refrigerante = backend.add_menu_item(restaurant.id, "Refrigerante", Decimal::new(800, 2));
        backend.add_menu_item(restaurant.id, "Pizza Calabresa", Decimal::new(4800, 2));

        backend.add_coupon(restaurant.id, "DEZ", DiscountType::Percentage, Decimal::new(10, 0), true);
        backend.add_coupon(restaurant.id, "CINCO", DiscountType::Fixed, Decimal::new(5, 0), true);
        backend.add_coupon(restaurant.id, "VELHO10", DiscountType::Percentage, Decimal::new(10, 0), false);

        let settings = EngineSettings {
            menu_base_url: MENU_BASE_URL.to_string(),
            session_ttl,
            default_customer_name: "cliente".to_string(),
        };
        let state = AppState::new(std::sync::Arc::new(backend.clone()), settings, "whatsapp:");
        let router = build_router(state, Duration::from_secs(10));

        TestApp {
            router,
            backend,
            restaurant,
            pizza,
            refrigerante,
        }
    }

    /// Posts a webhook form; fields left out are simply absent.
    pub async fn post_form(&self, fields: &[(&str, &str)]) -> (StatusCode, Option<String>, String) {
        post_webhook(self.router.clone(), fields).await
    }

    /// Sends `text` from the default customer and returns the reply text.
    pub async fn say(&self, text: &str) -> String {
        let from = format!("whatsapp:{}", CUSTOMER_NUMBER);
        let to = format!("whatsapp:+{}", RESTAURANT_NUMBER);
        let (status, _, body) = self
            .post_form(&[("From", from.as_str()), ("To", to.as_str()), ("Body", text)])
            .await;
        assert_eq!(status, StatusCode::OK, "unexpected status, body: {}", body);
        message_text(&body)
    }

    /// Posts `body` to the webhook with an arbitrary (or no) content type.
    pub async fn post_raw(&self, content_type: Option<&str>, body: &str) -> (StatusCode, String) {
        let mut request = Request::builder().method("POST").uri("/webhooks/whatsapp");
        if let Some(content_type) = content_type {
            request = request.header(header::CONTENT_TYPE, content_type);
        }
        let response = self
            .router
            .clone()
            .oneshot(
                request
                    .body(Body::from(body.to_string()))
                    .expect("request should build"),
            )
            .await
            .expect("router should respond");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body should be readable")
            .to_bytes();
        (status, String::from_utf8_lossy(&bytes).to_string())
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, String) {
        let response = self
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .uri(uri)
                    .body(Body::empty())
                    .expect("request should build"),
            )
            .await
            .expect("router should respond");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body should be readable")
            .to_bytes();
        (status, String::from_utf8_lossy(&bytes).to_string())
    }
}

/// Posts a form to the webhook; returns status, content type and body.
pub async fn post_webhook(
    router: Router,
    fields: &[(&str, &str)],
) -> (StatusCode, Option<String>, String) {
    let body = serde_urlencoded::to_string(fields).expect("form should encode");
    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhooks/whatsapp")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(body))
                .expect("request should build"),
        )
        .await
        .expect("router should respond");

    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body should be readable")
        .to_bytes();
    (status, content_type, String::from_utf8_lossy(&bytes).to_string())
}

/// Unescaped content of `<Message>` in a reply document.
pub fn message_text(xml: &str) -> String {
    let start = xml.find("<Message>").expect("reply should have a Message") + "<Message>".len();
    let end = xml.find("</Message>").expect("reply should close Message");
    xml[start..end]
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

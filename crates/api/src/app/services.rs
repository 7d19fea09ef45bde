//! Service wiring: stores, gateway, bus and the services the routes call.

use std::sync::Arc;

use anyhow::Context;

use storefront_catalog::Product;
use storefront_events::InMemoryEventBus;
use storefront_infra::{
    EventPublisher, InMemoryCatalog, OwnerLocks,
    cart_store::{PersistentCartStore, SessionCartStore},
    gateway::{PaymentGateway, SimulatedGateway, StripeGateway},
    notify::{LogNotifier, Notifier},
    services::{CartService, CheckoutService, SettlementService},
    store::{InMemoryOrderStore, InMemoryPaymentStore, OrderStore, PaymentStore},
    workers::{NotificationHandler, NotificationWorker, WorkerHandle},
};
use storefront_payments::WebhookVerifier;

use crate::auth::Hs256JwtValidator;
use crate::config::ServerConfig;
use crate::middleware::{AdminState, AuthState};

pub struct AppServices {
    pub catalog: Arc<InMemoryCatalog>,
    pub carts: CartService,
    pub checkout: CheckoutService,
    pub settlement: SettlementService,
    pub orders: Arc<dyn OrderStore>,
    pub payments: Arc<dyn PaymentStore>,
    pub publisher: EventPublisher,
    /// Present when no gateway key is configured.
    pub simulated_gateway: Option<Arc<SimulatedGateway>>,
    pub auth: AuthState,
    pub admin: AdminState,
    notifier: Arc<dyn Notifier>,
    from_email: String,
}

impl AppServices {
    pub fn build(config: &ServerConfig) -> anyhow::Result<Self> {
        Self::with_notifier(config, Arc::new(LogNotifier))
    }

    pub fn with_notifier(config: &ServerConfig, notifier: Arc<dyn Notifier>) -> anyhow::Result<Self> {
        let catalog = Arc::new(InMemoryCatalog::new());
        if let Some(path) = &config.catalog_file {
            let raw = std::fs::read(path).with_context(|| format!("reading catalog file {}", path.display()))?;
            let products: Vec<Product> =
                serde_json::from_slice(&raw).with_context(|| format!("parsing catalog file {}", path.display()))?;
            tracing::info!(products = products.len(), "catalog loaded");
            for p in products {
                catalog.upsert(p);
            }
        }

        let (gateway, simulated_gateway): (Arc<dyn PaymentGateway>, _) = match &config.stripe_secret_key {
            Some(key) => (
                Arc::new(StripeGateway::new(config.stripe_api_base.clone(), key.clone())),
                None,
            ),
            None => {
                tracing::warn!("STRIPE_SECRET_KEY not set; using the simulated payment gateway");
                let sim = Arc::new(SimulatedGateway::new(config.public_base_url.trim_end_matches('/')));
                (sim.clone() as Arc<dyn PaymentGateway>, Some(sim))
            }
        };

        let orders: Arc<dyn OrderStore> = Arc::new(InMemoryOrderStore::new());
        let payments: Arc<dyn PaymentStore> = Arc::new(InMemoryPaymentStore::new());
        let publisher = EventPublisher::new(Arc::new(InMemoryEventBus::new()));

        let carts = CartService::new(
            catalog.clone(),
            Arc::new(SessionCartStore::new()),
            Arc::new(PersistentCartStore::new()),
            Arc::new(OwnerLocks::new()),
        );
        let checkout = CheckoutService::new(
            carts.clone(),
            orders.clone(),
            payments.clone(),
            gateway.clone(),
            publisher.clone(),
            config.checkout_settings(),
        );
        let verifier = Arc::new(WebhookVerifier::new(
            config.stripe_webhook_secret.as_bytes(),
            config.webhook_tolerance_secs,
        ));
        let settlement = SettlementService::new(
            orders.clone(),
            payments.clone(),
            gateway,
            verifier,
            publisher.clone(),
        );

        Ok(Self {
            catalog,
            carts,
            checkout,
            settlement,
            orders,
            payments,
            publisher,
            simulated_gateway,
            auth: AuthState {
                jwt: Arc::new(Hs256JwtValidator::new(config.jwt_secret.as_bytes())),
            },
            admin: AdminState {
                token: config.admin_token.as_deref().filter(|t| !t.is_empty()).map(Arc::from),
            },
            notifier,
            from_email: config.from_email.clone(),
        })
    }

    /// Start the email worker on its own bus subscription.
    pub fn spawn_notifications(&self) -> std::io::Result<WorkerHandle> {
        let handler = NotificationHandler::new(self.notifier.clone(), self.orders.clone(), self.from_email.clone())
            .with_currency(&self.checkout.settings().currency);
        NotificationWorker::spawn(self.publisher.subscribe(), handler)
    }
}

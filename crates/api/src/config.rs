//! Server configuration.

use std::path::PathBuf;

use clap::Parser;

use storefront_core::{Money, TaxRate};
use storefront_infra::services::CheckoutSettings;
use storefront_observability::LogFormat;
use storefront_payments::DEFAULT_TOLERANCE_SECS;

/// Storefront API server configuration. Every flag can also come from the
/// environment.
#[derive(Debug, Clone, Parser)]
#[command(name = "storefront-api", about = "Storefront cart and checkout API", long_about = None)]
pub struct ServerConfig {
    /// Server host address
    #[arg(short = 'H', long, env = "SERVER_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Server port
    #[arg(short, long, env = "SERVER_PORT", default_value = "8080")]
    pub port: u16,

    /// Externally visible base URL, used for gateway return URLs
    #[arg(long, env = "PUBLIC_BASE_URL", default_value = "http://localhost:8080")]
    pub public_base_url: String,

    /// HS256 secret for customer bearer tokens
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: String,

    /// Token for the payment administration routes; unset disables them
    #[arg(long, env = "ADMIN_TOKEN", hide_env_values = true)]
    pub admin_token: Option<String>,

    /// Sales tax in basis points (1000 = 10%)
    #[arg(long, env = "TAX_RATE_BPS", default_value_t = 1000)]
    pub tax_rate_bps: u32,

    /// Currency code sent to the gateway
    #[arg(long, env = "CURRENCY", default_value = "usd")]
    pub currency: String,

    /// Gateway secret key; unset runs the in-process simulated gateway
    #[arg(long, env = "STRIPE_SECRET_KEY", hide_env_values = true)]
    pub stripe_secret_key: Option<String>,

    /// Webhook endpoint signing secret
    #[arg(long, env = "STRIPE_WEBHOOK_SECRET", hide_env_values = true)]
    pub stripe_webhook_secret: String,

    /// Gateway API base URL
    #[arg(long, env = "STRIPE_API_BASE", default_value = "https://api.stripe.com")]
    pub stripe_api_base: String,

    /// Accepted clock skew on webhook signatures, in seconds
    #[arg(long, env = "WEBHOOK_TOLERANCE_SECS", default_value_t = DEFAULT_TOLERANCE_SECS)]
    pub webhook_tolerance_secs: i64,

    /// Sender address for order emails
    #[arg(long, env = "DEFAULT_FROM_EMAIL", default_value = "noreply@furniturestore.com")]
    pub from_email: String,

    /// JSON file with the product catalog to load at startup
    #[arg(long, env = "CATALOG_FILE")]
    pub catalog_file: Option<PathBuf>,

    /// Log output format (json or pretty)
    #[arg(long, env = "LOG_FORMAT", default_value = "json")]
    pub log_format: LogFormat,
}

impl ServerConfig {
    pub fn load() -> Result<Self, clap::Error> {
        Self::try_parse()
    }

    #[must_use]
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn checkout_settings(&self) -> CheckoutSettings {
        CheckoutSettings {
            tax_rate: TaxRate::from_basis_points(self.tax_rate_bps),
            shipping_cost: Money::ZERO,
            currency: self.currency.to_ascii_lowercase(),
            public_base_url: self.public_base_url.trim_end_matches('/').to_string(),
        }
    }
}

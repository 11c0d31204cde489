use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Postgres {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Deserialize)]
pub struct Http {
    pub listen: String,
}

#[derive(Debug, Deserialize)]
pub struct Auth {
    pub session_ttl_secs: i64,
}

#[derive(Debug, Deserialize)]
pub struct Rewards {
    pub interval_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct Prices {
    pub interval_secs: u64,
    #[serde(default)]
    pub simulate_all_products: bool,
}

#[derive(Debug, Deserialize)]
pub struct Payments {
    pub url: String,
    pub auth_token: String,
    pub webhook_secret: String,
    pub min_deposit_in_cents: i64,
    pub min_withdrawal_in_cents: i64,
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub postgres: Postgres,
    pub http: Http,
    pub auth: Auth,
    pub rewards: Rewards,
    pub prices: Prices,
    pub payments: Payments,
}

fn default_max_connections() -> u32 {
    5
}

impl Settings {
    pub fn new(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix("MINING_MARKET").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct LookupConfig {
    pub enabled: bool,
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub api_key: Option<String>,
    pub max_connections: u32,
    pub store_timeout_secs: u64,
    pub lookup: LookupConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let lookup = LookupConfig {
            enabled: std::env::var("OFF_ENABLED")
                .map(|v| !matches!(v.as_str(), "0" | "false" | "no"))
                .unwrap_or(true),
            base_url: std::env::var("OFF_BASE_URL")
                .unwrap_or_else(|_| "https://world.openfoodfacts.org".into()),
            timeout_secs: parsed("OFF_TIMEOUT_SECS").unwrap_or(5),
        };
        Ok(Self {
            database_url: non_empty("DATABASE_URL"),
            api_key: non_empty("API_KEY"),
            max_connections: parsed("DB_MAX_CONNECTIONS").unwrap_or(10),
            store_timeout_secs: parsed("STORE_TIMEOUT_SECS").unwrap_or(5),
            lookup,
        })
    }
}

fn non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}

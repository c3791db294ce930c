//! Startup configuration, read once from the process environment (§6).
//! Every variable here is required to be syntactically present; absence is a
//! fatal initialization error (§7) surfaced via `.expect()` in `main`.

use std::env;

pub struct KafkaConfig {
    pub servers: String,
    pub security_protocol: String,
    pub sasl_mechanism: Option<String>,
    pub sasl_username: Option<String>,
    pub sasl_password: Option<String>,
    pub group_id: String,
    pub auto_offset_reset: String,
    pub enable_auto_commit: bool,
    pub auto_commit_interval_ms: u32,
    pub session_timeout_ms: u32,
    pub request_timeout_ms: u32,
}

pub struct SmartTyreConfig {
    pub base_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub sign_key: String,
}

pub struct Config {
    pub mysql_uri: String,
    pub mongo_uri: String,
    pub bind_addr: String,
    pub kafka: KafkaConfig,
    pub smarttyre: SmartTyreConfig,
}

fn var(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} must be set"))
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn var_bool_or(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn var_u32_or(key: &str, default: u32) -> u32 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            mysql_uri: var("MYSQL_URI"),
            mongo_uri: var("MONGO_URI"),
            bind_addr: var_or("BIND_ADDR", "0.0.0.0:8080"),
            kafka: KafkaConfig {
                servers: var("KAFKA_SERVERS"),
                security_protocol: var_or("KAFKA_SECURITY", "PLAINTEXT"),
                sasl_mechanism: env::var("KAFKA_MECHANISM").ok(),
                sasl_username: env::var("KAFKA_USERNAME").ok(),
                sasl_password: env::var("KAFKA_PASSWORD").ok(),
                group_id: var("KAFKA_GROUP_ID"),
                auto_offset_reset: var_or("KAFKA_AUTO_OFFSET_RESET", "latest"),
                enable_auto_commit: var_bool_or("KAFKA_ENABLE_AUTO_COMMIT", true),
                auto_commit_interval_ms: var_u32_or("KAFKA_AUTO_COMMIT_INTERVAL_MS", 1000),
                session_timeout_ms: var_u32_or("KAFKA_SESSION_TIMEOUT_MS", 120_000),
                request_timeout_ms: var_u32_or("KAFKA_REQUEST_TIMEOUT_MS", 180_000),
            },
            smarttyre: SmartTyreConfig {
                base_url: var("SMARTTYRE_BASE_URL"),
                client_id: var("SMARTTYRE_CLIENT_ID"),
                client_secret: var("SMARTTYRE_CLIENT_SECRET"),
                sign_key: var("SMARTTYRE_SIGN_KEY"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn var_or_falls_back_to_default_when_unset() {
        assert_eq!(var_or("INGEST_TEST_UNSET_VAR_XYZ", "latest"), "latest");
    }

    #[test]
    fn var_bool_or_falls_back_on_unparsable_value() {
        env::set_var("INGEST_TEST_BOOL_VAR", "not-a-bool");
        assert!(var_bool_or("INGEST_TEST_BOOL_VAR", true));
        env::remove_var("INGEST_TEST_BOOL_VAR");
    }

    #[test]
    fn var_u32_or_parses_a_set_value() {
        env::set_var("INGEST_TEST_U32_VAR", "2500");
        assert_eq!(var_u32_or("INGEST_TEST_U32_VAR", 1000), 2500);
        env::remove_var("INGEST_TEST_U32_VAR");
    }
}

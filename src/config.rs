use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_server_port")]
    pub server_port: u16,
    pub database_url: String,
    /// Bot token from @BotFather; the shared secret behind `initData`.
    pub bot_token: String,
    /// HS256 key for the session tokens handed out after login.
    pub session_secret: String,
    #[serde(default = "default_session_ttl_minutes")]
    pub session_ttl_minutes: i64,
}

fn default_server_port() -> u16 {
    8000
}

fn default_session_ttl_minutes() -> i64 {
    60
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::Environment::default())
            .build()?;
        config.try_deserialize()
    }
}

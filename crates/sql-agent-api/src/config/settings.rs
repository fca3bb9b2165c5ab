use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a SQL assistant for the database '{{DATABASE}}'. \
Only answer questions related to the table '{{TABLE}}'. \
Do not reference any other tables. If the user asks about non-existing tables, \
inform them politely that only '{{TABLE}}' is available.";

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ConfigError),

    #[error("Missing required configuration value: {0}")]
    ConfigurationMissing(&'static str),
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub cache: CacheConfig,
    pub long_term: LongTermConfig,
    pub memory: MemoryConfig,
    pub agent: AgentConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    Redis,
    Memory,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    pub host: String,
    pub port: u16,
    /// Overrides host/port when set (e.g. `rediss://` with credentials)
    #[serde(default)]
    pub url: Option<String>,
}

impl CacheConfig {
    pub fn connection_url(&self) -> String {
        match &self.url {
            Some(url) if !url.trim().is_empty() => url.clone(),
            _ => format!("redis://{}:{}/", self.host, self.port),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LongTermBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LongTermConfig {
    pub backend: LongTermBackend,
    #[serde(default)]
    pub url: String,
    pub max_connections: u32,
    pub table: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MemoryConfig {
    pub context_ttl_seconds: u64,
    pub response_ttl_seconds: u64,
}

impl MemoryConfig {
    pub fn context_ttl(&self) -> Duration {
        Duration::from_secs(self.context_ttl_seconds)
    }

    pub fn response_ttl(&self) -> Duration {
        Duration::from_secs(self.response_ttl_seconds)
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            context_ttl_seconds: 300,
            response_ttl_seconds: 300,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AgentConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    pub model: String,
    pub table: String,
    pub system_prompt: String,
    pub timeout_seconds: u64,
    pub max_tokens: usize,
    pub temperature: f32,
    pub database: DatabaseConfig,
}

impl AgentConfig {
    /// System prompt with the table and database placeholders filled in
    pub fn render_system_prompt(&self) -> String {
        self.system_prompt
            .replace("{{TABLE}}", &self.table)
            .replace("{{DATABASE}}", &self.database.name)
    }
}

/// MySQL database the agent's SQL tool server queries
#[derive(Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub name: String,
}

impl DatabaseConfig {
    /// `host:port/name`, safe to log
    pub fn target(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.name)
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .field("name", &self.name)
            .finish()
    }
}

impl Settings {
    pub fn load() -> Result<Self, SettingsError> {
        dotenvy::dotenv().ok();

        let config = Self::builder()?
            .add_source(File::with_name("config/settings").required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8000)?
            .set_default("cache.backend", "redis")?
            .set_default("cache.host", "localhost")?
            .set_default("cache.port", 6379)?
            .set_default("long_term.backend", "postgres")?
            .set_default("long_term.url", "")?
            .set_default("long_term.max_connections", 5)?
            .set_default("long_term.table", "conversation_history")?
            .set_default("memory.context_ttl_seconds", 300)?
            .set_default("memory.response_ttl_seconds", 300)?
            .set_default("agent.base_url", "https://api.groq.com/openai")?
            .set_default("agent.api_key", "")?
            .set_default("agent.model", "meta-llama/llama-4-maverick-17b-128e-instruct")?
            .set_default("agent.table", "tharun111")?
            .set_default("agent.system_prompt", DEFAULT_SYSTEM_PROMPT)?
            .set_default("agent.timeout_seconds", 60)?
            .set_default("agent.max_tokens", 1024)?
            .set_default("agent.temperature", 0.0)?
            .set_default("agent.database.host", "localhost")?
            .set_default("agent.database.port", 3306)?
            .set_default("agent.database.user", "")?
            .set_default("agent.database.password", "")?
            .set_default("agent.database.name", "")
    }

    /// Refuses to start with missing credentials or unusable TTLs.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.agent.api_key.trim().is_empty() {
            return Err(SettingsError::ConfigurationMissing("agent.api_key"));
        }
        if self.agent.base_url.trim().is_empty() {
            return Err(SettingsError::ConfigurationMissing("agent.base_url"));
        }
        if self.agent.database.host.trim().is_empty() {
            return Err(SettingsError::ConfigurationMissing("agent.database.host"));
        }
        if self.agent.database.user.trim().is_empty() {
            return Err(SettingsError::ConfigurationMissing("agent.database.user"));
        }
        if self.agent.database.name.trim().is_empty() {
            return Err(SettingsError::ConfigurationMissing("agent.database.name"));
        }
        if self.long_term.backend == LongTermBackend::Postgres && self.long_term.url.trim().is_empty() {
            return Err(SettingsError::ConfigurationMissing("long_term.url"));
        }
        if self.memory.context_ttl_seconds == 0 {
            return Err(SettingsError::ConfigurationMissing("memory.context_ttl_seconds"));
        }
        if self.memory.response_ttl_seconds == 0 {
            return Err(SettingsError::ConfigurationMissing("memory.response_ttl_seconds"));
        }
        Ok(())
    }
}

use std::path::Path;

use config::builder::DefaultState;
use config::{ConfigBuilder, Environment, File};
use serde::Deserialize;

use crate::error::AppError;

/// Runtime configuration, layered from defaults, an optional TOML file and
/// `MICROBLOG__*` environment variables (highest precedence).
///
/// Nested keys use `__` in environment variable names, e.g.
/// `MICROBLOG__SEARCH__URL=http://localhost:7700`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub search: SearchConfig,
    pub mail: MailConfig,
    /// Administrator addresses. The first one signs outgoing job emails.
    pub admins: Vec<String>,
    pub posts_per_page: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// MongoDB connection string. Without one, records live in memory.
    pub uri: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchConfig {
    /// Meilisearch URL. Without one (and without `in_memory`), search is
    /// disabled.
    pub url: Option<String>,
    pub api_key: Option<String>,
    /// Use the embedded engine instead of Meilisearch.
    #[serde(default)]
    pub in_memory: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    pub server: Option<String>,
    pub port: u16,
    pub use_tls: bool,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            server: None,
            port: 587,
            use_tls: false,
            username: None,
            password: None,
        }
    }
}

impl AppConfig {
    /// Load the configuration, reading `path` when given.
    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        let mut builder = defaults()?;

        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }

        builder = builder.add_source(
            Environment::with_prefix("MICROBLOG")
                .prefix_separator("__")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("admins")
                .try_parsing(true),
        );

        Ok(builder.build()?.try_deserialize()?)
    }

    /// Address used as the sender of emails produced by background jobs.
    pub fn mail_sender(&self) -> String {
        self.admins.first().cloned().unwrap_or_else(|| {
            let host = self.mail.server.as_deref().unwrap_or("localhost");
            format!("no-reply@{host}")
        })
    }
}

fn defaults() -> Result<ConfigBuilder<DefaultState>, AppError> {
    Ok(config::Config::builder()
        .set_default("server.bind_addr", "127.0.0.1:3000")?
        .set_default("database.name", "microblog")?
        .set_default("search.in_memory", false)?
        .set_default("mail.port", 587)?
        .set_default("mail.use_tls", false)?
        .set_default("admins", Vec::<String>::new())?
        .set_default("posts_per_page", 25)?)
}

use dotenvy::dotenv;
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthApiConfig,
    pub smtp: SmtpConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// Hosted authentication service this application delegates sessions to.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthApiConfig {
    pub base_url: String,
    pub api_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub server: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
    /// Mailbox that receives the new-ticket notifications.
    pub notify_to: String,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        dotenv().ok();

        Ok(Self {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("SERVER_PORT")
                    .unwrap_or_else(|_| "8080".to_string())
                    .parse()?,
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")?,
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()?,
            },
            auth: AuthApiConfig {
                base_url: env::var("AUTH_BASE_URL")?,
                api_key: env::var("AUTH_API_KEY")?,
            },
            smtp: SmtpConfig {
                server: env::var("SMTP_SERVER")?,
                port: env::var("SMTP_PORT")
                    .unwrap_or_else(|_| "587".to_string())
                    .parse()?,
                username: env::var("SMTP_USERNAME")?,
                password: env::var("SMTP_PASSWORD")?,
                from: env::var("SMTP_FROM")?,
                notify_to: env::var("SAV_NOTIFY_TO")?,
            },
        })
    }
}

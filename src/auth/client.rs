//! Client for the hosted authentication service. Sessions are opaque bearer
//! tokens issued and validated by the service; this application never
//! inspects them.

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::AuthApiConfig;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("auth service request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("auth service returned {0}")]
    Status(StatusCode),
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserMetadata {
    pub name: Option<String>,
    pub company: Option<String>,
    pub role: Option<String>,
}

/// Authenticated identity as reported by the auth service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: UserMetadata,
}

impl Identity {
    /// Display name fallback chain used when provisioning a profile:
    /// metadata name, then the mailbox part of the email, then "Admin".
    pub fn display_name(&self) -> String {
        if let Some(name) = &self.user_metadata.name {
            if !name.is_empty() {
                return name.clone();
            }
        }
        self.email
            .as_deref()
            .and_then(|e| e.split('@').next())
            .filter(|local| !local.is_empty())
            .unwrap_or("Admin")
            .to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    pub token_type: String,
    pub user: Identity,
}

#[derive(Debug, Serialize)]
struct PasswordGrant<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct SignUpRequest<'a> {
    email: &'a str,
    password: &'a str,
    data: UserMetadata,
}

pub struct AuthClient {
    config: AuthApiConfig,
    client: Client,
}

impl AuthClient {
    pub fn new(config: AuthApiConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    /// Register a new account. The role carried in the metadata is the
    /// sign-up default; the profile row itself is provisioned lazily on the
    /// first authenticated request.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: UserMetadata,
    ) -> Result<Identity, AuthError> {
        let url = format!("{}/auth/v1/signup", self.config.base_url);
        let response = self
            .client
            .post(&url)
            .header("apikey", &self.config.api_key)
            .json(&SignUpRequest {
                email,
                password,
                data: metadata,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AuthError::Status(response.status()));
        }
        Ok(response.json::<Identity>().await?)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, AuthError> {
        let url = format!(
            "{}/auth/v1/token?grant_type=password",
            self.config.base_url
        );
        let response = self
            .client
            .post(&url)
            .header("apikey", &self.config.api_key)
            .json(&PasswordGrant { email, password })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AuthError::Status(response.status()));
        }
        Ok(response.json::<AuthSession>().await?)
    }

    pub async fn sign_out(&self, token: &str) -> Result<(), AuthError> {
        let url = format!("{}/auth/v1/logout", self.config.base_url);
        let response = self
            .client
            .post(&url)
            .header("apikey", &self.config.api_key)
            .bearer_auth(token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AuthError::Status(response.status()));
        }
        Ok(())
    }

    /// Resolve the identity behind a session token. An expired or unknown
    /// token yields `None`, not an error.
    pub async fn get_current_user(&self, token: &str) -> Result<Option<Identity>, AuthError> {
        let url = format!("{}/auth/v1/user", self.config.base_url);
        let response = self
            .client
            .get(&url)
            .header("apikey", &self.config.api_key)
            .bearer_auth(token)
            .send()
            .await?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(None),
            status if status.is_success() => Ok(Some(response.json::<Identity>().await?)),
            status => Err(AuthError::Status(status)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_for(server: &mockito::ServerGuard) -> AuthClient {
        AuthClient::new(AuthApiConfig {
            base_url: server.url(),
            api_key: "test-key".to_string(),
        })
    }

    fn identity_json(id: &str) -> String {
        serde_json::json!({
            "id": id,
            "email": "jean@x.com",
            "user_metadata": { "name": "Jean Dupont", "company": "Dupont SARL" }
        })
        .to_string()
    }

    #[tokio::test]
    async fn current_user_resolves_identity() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/auth/v1/user")
            .match_header("authorization", "Bearer tok-1")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(identity_json("5a2f1f8e-8f6e-4f4b-9d08-0cf0a85f2f11"))
            .create_async()
            .await;

        let user = client_for(&server)
            .get_current_user("tok-1")
            .await
            .expect("request should succeed")
            .expect("identity expected");
        assert_eq!(user.email.as_deref(), Some("jean@x.com"));
        assert_eq!(user.display_name(), "Jean Dupont");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn expired_token_is_none_not_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/auth/v1/user")
            .with_status(401)
            .create_async()
            .await;

        let user = client_for(&server)
            .get_current_user("stale")
            .await
            .expect("401 is not a transport error");
        assert!(user.is_none());
    }

    #[tokio::test]
    async fn sign_in_returns_session_token() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/auth/v1/token?grant_type=password")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(format!(
                r#"{{"access_token":"tok-2","token_type":"bearer","user":{}}}"#,
                identity_json("5a2f1f8e-8f6e-4f4b-9d08-0cf0a85f2f11")
            ))
            .create_async()
            .await;

        let session = client_for(&server)
            .sign_in("jean@x.com", "secret")
            .await
            .expect("sign in should succeed");
        assert_eq!(session.access_token, "tok-2");
    }

    #[test]
    fn display_name_falls_back_to_mailbox_then_admin() {
        let mut identity = Identity {
            id: Uuid::new_v4(),
            email: Some("jean@x.com".to_string()),
            user_metadata: UserMetadata::default(),
        };
        assert_eq!(identity.display_name(), "jean");

        identity.email = None;
        assert_eq!(identity.display_name(), "Admin");
    }
}

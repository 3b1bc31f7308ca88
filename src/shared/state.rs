use std::sync::Arc;

use crate::auth::client::AuthClient;
use crate::config::AppConfig;
use crate::email::Notifier;
use crate::shared::utils::DbPool;

pub struct AppState {
    pub conn: DbPool,
    pub config: Arc<AppConfig>,
    pub auth: Arc<AuthClient>,
    pub notifier: Arc<dyn Notifier>,
}

impl Clone for AppState {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
            config: Arc::clone(&self.config),
            auth: Arc::clone(&self.auth),
            notifier: Arc::clone(&self.notifier),
        }
    }
}

use std::sync::Arc;

use sqlx::PgPool;

use crate::{
    auth::{
        jwt::SessionKeys,
        repo::{PgUserStore, UserStore},
    },
    config::AppConfig,
    contacts::repo::{ContactStore, PgContactStore},
    mail::{Mailer, ResendMailer},
    storage::{Storage, StorageClient},
    tags::repo::{PgTagStore, TagStore},
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub keys: SessionKeys,
    pub users: Arc<dyn UserStore>,
    pub contacts: Arc<dyn ContactStore>,
    pub tags: Arc<dyn TagStore>,
    pub storage: Arc<dyn StorageClient>,
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    /// Wires the Postgres stores and the real S3 and mail clients.
    pub async fn init(config: Arc<AppConfig>, db: PgPool) -> anyhow::Result<Self> {
        let storage = Arc::new(Storage::new(&config.storage).await?) as Arc<dyn StorageClient>;
        let mailer = Arc::new(ResendMailer::new(&config.mail)?) as Arc<dyn Mailer>;

        Ok(Self {
            keys: SessionKeys::new(&config.jwt),
            users: Arc::new(PgUserStore::new(db.clone())),
            contacts: Arc::new(PgContactStore::new(db.clone())),
            tags: Arc::new(PgTagStore::new(db)),
            config,
            storage,
            mailer,
        })
    }

    #[cfg(test)]
    pub fn fake() -> Self {
        crate::testing::TestEnv::new().state
    }
}

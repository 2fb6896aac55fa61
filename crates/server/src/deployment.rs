use db::{DBService, DbErr};
use utils_jwt::JwtManager;

const JWT_SECRET_ENV: &str = "TASKTRAIL_JWT_SECRET";
const DEV_JWT_SECRET: &str = "insecure-dev-secret";

/// Shared per-process services handed to every request handler.
#[derive(Clone)]
pub struct Deployment {
    db: DBService,
    jwt: JwtManager,
}

impl Deployment {
    pub async fn new() -> Result<Self, DbErr> {
        let secret = match std::env::var(JWT_SECRET_ENV) {
            Ok(secret) if !secret.trim().is_empty() => secret,
            _ => {
                tracing::warn!(
                    "{JWT_SECRET_ENV} is not set; using an insecure development secret"
                );
                DEV_JWT_SECRET.to_string()
            }
        };

        let db = DBService::new().await?;

        Ok(Self {
            db,
            jwt: JwtManager::new(&secret),
        })
    }

    pub fn db(&self) -> &DBService {
        &self.db
    }

    pub fn jwt(&self) -> &JwtManager {
        &self.jwt
    }
}

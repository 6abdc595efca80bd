use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::info;

use crate::gateway::{Gateway, TemporaryLink};
use crate::result::Result;
use crate::AppError;

/// Short-lived opaque tokens that stand in for an upstream url
#[derive(Clone)]
pub struct LinkService {
    gateway: Arc<dyn Gateway>,
    ttl: Duration,
}

impl LinkService {
    pub fn new(gateway: Arc<dyn Gateway>, ttl: Duration) -> Self {
        Self { gateway, ttl }
    }

    pub async fn generate(
        &self,
        identity: &str,
        url: &str,
        title: Option<String>,
    ) -> Result<TemporaryLink> {
        match url::Url::parse(url) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
            _ => return Err(AppError::bad_request(format!("invalid url: {}", url))),
        }
        let now = Utc::now();
        let link = TemporaryLink {
            token: uuid::Uuid::new_v4().simple().to_string(),
            identity: identity.to_string(),
            url: url.to_string(),
            title,
            created_at: now,
            expires_at: now + chrono::Duration::from_std(self.ttl)?,
        };
        self.gateway.create_temporary_link(link.clone()).await?;
        info!("link {} created for {}", link.token, identity);
        Ok(link)
    }

    /// Only unexpired links resolve
    pub async fn get(&self, token: &str) -> Result<TemporaryLink> {
        self.gateway
            .get_temporary_link(token)
            .await?
            .filter(|link| link.expires_at > Utc::now())
            .ok_or_else(|| AppError::LinkNotFound(token.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MemoryGateway;

    #[tokio::test]
    async fn test_generate_and_resolve() {
        let links = LinkService::new(Arc::new(MemoryGateway::new()), Duration::from_secs(60));
        let link = links
            .generate("alice", "http://provider.example/movie/42.mp4", None)
            .await
            .unwrap();
        assert_eq!(link.token.len(), 32);
        assert_eq!(links.get(&link.token).await.unwrap().url, link.url);
        assert!(matches!(
            links.get("missing").await,
            Err(AppError::LinkNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_expired_link_does_not_resolve() {
        let links = LinkService::new(Arc::new(MemoryGateway::new()), Duration::ZERO);
        let link = links
            .generate("alice", "http://provider.example/a.ts", None)
            .await
            .unwrap();
        assert!(links.get(&link.token).await.is_err());
    }

    #[tokio::test]
    async fn test_rejects_non_http_url() {
        let links = LinkService::new(Arc::new(MemoryGateway::new()), Duration::from_secs(60));
        assert!(matches!(
            links.generate("alice", "file:///etc/passwd", None).await,
            Err(AppError::BadRequest(_))
        ));
    }
}

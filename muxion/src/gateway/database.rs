use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectOptions, Database, DatabaseConnection, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use tracing::info;

use api::media::{StreamKind, VodStatus};

use crate::config::Database as DatabaseConfig;
use crate::entity::linked_identities::Entity as LinkedIdentities;
use crate::entity::stream_history;
use crate::entity::temporary_links::{self, Entity as TemporaryLinks};
use crate::entity::vod_cache::{self, Entity as VodCache};
use crate::migration::{Migrator, MigratorTrait};

use super::{Gateway, LinkedIdentity, StreamStart, TemporaryLink, VodCacheEntry};

#[derive(Clone)]
pub struct DatabaseGateway {
    connection: DatabaseConnection,
}

impl DatabaseGateway {
    pub async fn new(config: &DatabaseConfig, url: &str) -> Result<Self> {
        let mut opt = ConnectOptions::new(url);
        opt.max_connections(config.max_connections)
            .connect_timeout(Duration::from_secs(config.connect_timeout))
            .idle_timeout(Duration::from_secs(600))
            .max_lifetime(Duration::from_secs(3600))
            .sqlx_logging(false);

        info!("Connecting to database: {}", url);
        let connection = Database::connect(opt).await?;

        info!("Running database migrations...");
        Migrator::up(&connection, None).await?;

        Ok(Self { connection })
    }

    pub fn get_connection(&self) -> &DatabaseConnection {
        &self.connection
    }
}

fn fixed(t: DateTime<Utc>) -> DateTime<FixedOffset> {
    DateTime::<FixedOffset>::from(t)
}

impl From<vod_cache::Model> for VodCacheEntry {
    fn from(model: vod_cache::Model) -> Self {
        Self {
            id: model.id,
            media_type: model.media_type.parse().unwrap_or(StreamKind::Movie),
            title: model.title,
            series_title: model.series_title,
            season: model.season,
            episode: model.episode,
            file_path: PathBuf::from(model.file_path),
            source_url: model.source_url,
            requested_by: model.requested_by,
            downloaded_bytes: model.downloaded_bytes.max(0) as u64,
            total_bytes: model.total_bytes.map(|v| v.max(0) as u64),
            final_size: model.final_size.map(|v| v.max(0) as u64),
            status: model.status.parse().unwrap_or(VodStatus::Failed),
            error: model.error,
            created_at: model.created_at.with_timezone(&Utc),
            expires_at: model.expires_at.with_timezone(&Utc),
            last_access_at: model.last_access_at.with_timezone(&Utc),
        }
    }
}

impl From<&VodCacheEntry> for vod_cache::ActiveModel {
    fn from(entry: &VodCacheEntry) -> Self {
        vod_cache::ActiveModel {
            id: Set(entry.id.clone()),
            media_type: Set(entry.media_type.to_string()),
            title: Set(entry.title.clone()),
            series_title: Set(entry.series_title.clone()),
            season: Set(entry.season),
            episode: Set(entry.episode),
            file_path: Set(entry.file_path.to_string_lossy().into_owned()),
            source_url: Set(entry.source_url.clone()),
            requested_by: Set(entry.requested_by.clone()),
            downloaded_bytes: Set(entry.downloaded_bytes as i64),
            total_bytes: Set(entry.total_bytes.map(|v| v as i64)),
            final_size: Set(entry.final_size.map(|v| v as i64)),
            status: Set(entry.status.to_string()),
            error: Set(entry.error.clone()),
            created_at: Set(fixed(entry.created_at)),
            expires_at: Set(fixed(entry.expires_at)),
            last_access_at: Set(fixed(entry.last_access_at)),
        }
    }
}

impl From<temporary_links::Model> for TemporaryLink {
    fn from(model: temporary_links::Model) -> Self {
        Self {
            token: model.token,
            identity: model.identity,
            url: model.url,
            title: model.title,
            created_at: model.created_at.with_timezone(&Utc),
            expires_at: model.expires_at.with_timezone(&Utc),
        }
    }
}

#[async_trait]
impl Gateway for DatabaseGateway {
    async fn record_stream_start(&self, start: StreamStart) -> Result<i64> {
        let record = stream_history::ActiveModel {
            identity: Set(start.identity),
            stream_id: Set(start.stream_id),
            stream_type: Set(start.kind.to_string()),
            title: Set(start.title),
            remote_addr: Set(start.net.remote_addr),
            user_agent: Set(start.net.user_agent),
            started_at: Set(fixed(Utc::now())),
            ..Default::default()
        };
        let inserted = record.insert(&self.connection).await?;
        Ok(inserted.id)
    }

    async fn create_temporary_link(&self, link: TemporaryLink) -> Result<()> {
        let model = temporary_links::ActiveModel {
            token: Set(link.token),
            identity: Set(link.identity),
            url: Set(link.url),
            title: Set(link.title),
            created_at: Set(fixed(link.created_at)),
            expires_at: Set(fixed(link.expires_at)),
        };
        model.insert(&self.connection).await?;
        Ok(())
    }

    async fn get_temporary_link(&self, token: &str) -> Result<Option<TemporaryLink>> {
        let link = TemporaryLinks::find_by_id(token.to_string())
            .one(&self.connection)
            .await?;
        Ok(link.map(Into::into))
    }

    async fn delete_expired_links(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = TemporaryLinks::delete_many()
            .filter(temporary_links::Column::ExpiresAt.lte(fixed(now)))
            .exec(&self.connection)
            .await?;
        Ok(result.rows_affected)
    }

    async fn upsert_vod_cache_entry(&self, entry: &VodCacheEntry) -> Result<()> {
        let model: vod_cache::ActiveModel = entry.into();
        VodCache::insert(model)
            .on_conflict(
                OnConflict::column(vod_cache::Column::Id)
                    .update_columns([
                        vod_cache::Column::MediaType,
                        vod_cache::Column::Title,
                        vod_cache::Column::SeriesTitle,
                        vod_cache::Column::Season,
                        vod_cache::Column::Episode,
                        vod_cache::Column::FilePath,
                        vod_cache::Column::SourceUrl,
                        vod_cache::Column::RequestedBy,
                        vod_cache::Column::DownloadedBytes,
                        vod_cache::Column::TotalBytes,
                        vod_cache::Column::FinalSize,
                        vod_cache::Column::Status,
                        vod_cache::Column::Error,
                        vod_cache::Column::CreatedAt,
                        vod_cache::Column::ExpiresAt,
                        vod_cache::Column::LastAccessAt,
                    ])
                    .to_owned(),
            )
            .exec(&self.connection)
            .await?;
        Ok(())
    }

    async fn get_vod_cache_entry(&self, id: &str) -> Result<Option<VodCacheEntry>> {
        let entry = VodCache::find_by_id(id.to_string())
            .one(&self.connection)
            .await?;
        Ok(entry.map(Into::into))
    }

    async fn touch_vod_cache_entry(&self, id: &str, now: DateTime<Utc>) -> Result<()> {
        VodCache::update_many()
            .col_expr(vod_cache::Column::LastAccessAt, Expr::value(fixed(now)))
            .filter(vod_cache::Column::Id.eq(id))
            .exec(&self.connection)
            .await?;
        Ok(())
    }

    async fn list_vod_cache_entries(&self, limit: u64) -> Result<Vec<VodCacheEntry>> {
        let entries = VodCache::find()
            .order_by_desc(vod_cache::Column::CreatedAt)
            .limit(limit)
            .all(&self.connection)
            .await?;
        Ok(entries.into_iter().map(Into::into).collect())
    }

    async fn delete_expired_vod_cache_entries(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<VodCacheEntry>> {
        let expired = VodCache::find()
            .filter(vod_cache::Column::ExpiresAt.lte(fixed(now)))
            .all(&self.connection)
            .await?;
        if expired.is_empty() {
            return Ok(vec![]);
        }

        let ids: Vec<String> = expired.iter().map(|m| m.id.clone()).collect();
        VodCache::delete_many()
            .filter(vod_cache::Column::Id.is_in(ids))
            .exec(&self.connection)
            .await?;
        Ok(expired.into_iter().map(Into::into).collect())
    }

    async fn resolve_linked_identity(&self, identity: &str) -> Result<Option<LinkedIdentity>> {
        let linked = LinkedIdentities::find_by_id(identity.to_string())
            .one(&self.connection)
            .await?;
        Ok(linked.map(|m| LinkedIdentity {
            alias_id: m.alias_id,
            alias_name: m.alias_name,
        }))
    }
}

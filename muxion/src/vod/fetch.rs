use anyhow::bail;
use api::media::VodStatus;
use chrono::Utc;
use futures_util::StreamExt;
use http::header;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::gateway::VodCacheEntry;
use crate::metrics;
use crate::vod::{part_path, remove_file, FetchClaim, VodCacheManager};

/// Downloads one entry into its part file, then publishes it under its
/// final name. Records the outcome through the gateway either way.
pub(crate) async fn run(manager: VodCacheManager, mut entry: VodCacheEntry, claim: FetchClaim) {
    let part = part_path(&entry.file_path);
    match download(&manager, &mut entry, &claim).await {
        Ok(size) => {
            entry.status = VodStatus::Ready;
            entry.downloaded_bytes = size;
            entry.final_size = Some(size);
            entry.error = None;
            metrics::VOD_READY.inc();
            info!(
                "vod {} ready, {} bytes at {}",
                entry.id,
                size,
                entry.file_path.display()
            );
        }
        Err(e) => {
            remove_file(&part).await;
            let failed_ttl = chrono::Duration::from_std(manager.config.failed_ttl)
                .unwrap_or_else(|_| chrono::Duration::minutes(10));
            entry.status = VodStatus::Failed;
            entry.error = Some(e.to_string());
            entry.expires_at = Utc::now() + failed_ttl;
            metrics::VOD_FAILED.inc();
            warn!("vod {} fetch {} error: {:?}", entry.id, entry.source_url, e);
        }
    }
    if let Err(e) = manager.gateway.upsert_vod_cache_entry(&entry).await {
        warn!("vod {} upsert error: {:?}", entry.id, e);
    }
    metrics::VOD_DOWNLOADING.dec();
    drop(claim);
}

async fn download(
    manager: &VodCacheManager,
    entry: &mut VodCacheEntry,
    claim: &FetchClaim,
) -> anyhow::Result<u64> {
    let part = part_path(&entry.file_path);

    let response = manager
        .client
        .get(&entry.source_url)
        .header(header::USER_AGENT, manager.config.user_agent.as_str())
        .header(header::ACCEPT, "*/*")
        .send()
        .await?;
    if !response.status().is_success() {
        bail!("upstream status {}", response.status());
    }
    entry.total_bytes = response.content_length();
    debug!(
        "vod {} upstream connected, length {:?}",
        entry.id, entry.total_bytes
    );
    claim.update(entry);

    let mut file = File::create(&part).await?;
    let mut body = response.bytes_stream();
    let mut reported = Instant::now();
    while let Some(bytes) = body.next().await {
        let bytes = bytes?;
        file.write_all(&bytes).await?;
        entry.downloaded_bytes += bytes.len() as u64;

        if reported.elapsed() >= manager.config.progress_interval {
            file.flush().await?;
            report_progress(manager, entry, claim).await;
            reported = Instant::now();
        }
    }
    file.flush().await?;
    file.sync_all().await?;
    drop(file);

    if let Some(total) = entry.total_bytes {
        if entry.downloaded_bytes != total {
            bail!(
                "short body, {} of {} bytes",
                entry.downloaded_bytes,
                total
            );
        }
    }
    fs::rename(&part, &entry.file_path).await?;
    Ok(entry.downloaded_bytes)
}

async fn report_progress(manager: &VodCacheManager, entry: &VodCacheEntry, claim: &FetchClaim) {
    claim.update(entry);
    if let Err(e) = manager.gateway.upsert_vod_cache_entry(entry).await {
        warn!("vod {} progress error: {:?}", entry.id, e);
    }
}

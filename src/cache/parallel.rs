//! Bounded parallel downloads
//!
//! Each download blocks its worker (lock wait, byte transfer), so they run on
//! the blocking pool with at most `max_concurrent` in flight.

use std::collections::VecDeque;
use std::sync::Arc;
use tokio::task::{JoinError, JoinSet};
use tracing::debug;

use crate::cache::download::{DownloadOptions, DownloadReport, ResourceDownloader, ResourceResolver};
use crate::cache::{CacheError, CacheManager};
use crate::module::artifact::Artifact;

pub const DEFAULT_MAX_CONCURRENT: usize = 4;

type Indexed = (usize, Result<DownloadReport, CacheError>);

fn handle_join_result(joined: Result<Indexed, JoinError>) -> Result<Indexed, CacheError> {
    joined.map_err(|e| CacheError::Worker(e.to_string()))
}

/// Download every artifact through `cache`, returning reports in request order
///
/// The first interruption or configuration error aborts the batch; tasks
/// already running finish on the blocking pool.
pub async fn download_all(
    cache: Arc<CacheManager>,
    artifacts: Vec<Artifact>,
    resolver: Arc<dyn ResourceResolver>,
    downloader: Arc<dyn ResourceDownloader>,
    options: DownloadOptions,
    max_concurrent: usize,
) -> Result<Vec<DownloadReport>, CacheError> {
    let max_concurrent = max_concurrent.max(1);
    let total = artifacts.len();
    let mut slots: Vec<Option<DownloadReport>> = vec![None; total];
    let mut queue: VecDeque<(usize, Artifact)> = artifacts.into_iter().enumerate().collect();
    let mut join_set = JoinSet::new();

    let mut store = |indexed: Indexed| -> Result<(), CacheError> {
        let (index, report) = indexed;
        slots[index] = Some(report?);
        Ok(())
    };

    while let Some((index, artifact)) = queue.pop_front() {
        let cache = Arc::clone(&cache);
        let resolver = Arc::clone(&resolver);
        let downloader = Arc::clone(&downloader);
        let options = options.clone();
        join_set.spawn_blocking(move || {
            let report = cache.download(&artifact, resolver.as_ref(), downloader.as_ref(), &options);
            (index, report)
        });

        if join_set.len() >= max_concurrent {
            if let Some(joined) = join_set.join_next().await {
                store(handle_join_result(joined)?)?;
            }
        }
    }

    while let Some(joined) = join_set.join_next().await {
        store(handle_join_result(joined)?)?;
    }

    debug!("Downloaded {} artifacts with up to {} workers", total, max_concurrent);
    slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| {
            slot.ok_or_else(|| CacheError::Worker(format!("no report for request {}", index)))
        })
        .collect()
}

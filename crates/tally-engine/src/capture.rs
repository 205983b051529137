//! Download capture with three fallback channels.
//!
//! Captured bytes land in a sibling `*.part` file and are renamed into place
//! only when a channel succeeds, so a failed capture never leaves a file at the
//! destination.

use crate::backend::Backend;
use crate::config::TallyConfig;
use crate::retry::{RetryPolicy, with_retry};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tally_common::{BackendError, Channel, DownloadResult, Outcome, SelectorSpec, Trigger};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureTimeouts {
    pub download_event: Duration,
    pub fallback_download: Duration,
    pub link_fetch: Duration,
}

impl CaptureTimeouts {
    pub fn from_config(config: &TallyConfig) -> Self {
        Self {
            download_event: Duration::from_millis(config.timeouts.download_event_ms),
            fallback_download: Duration::from_millis(config.timeouts.fallback_download_ms),
            link_fetch: Duration::from_millis(config.timeouts.link_fetch_ms),
        }
    }
}

pub struct DownloadCapturer<'a, B: Backend + ?Sized> {
    backend: &'a B,
    policy: RetryPolicy,
    timeouts: CaptureTimeouts,
    extensions: Vec<String>,
}

impl<'a, B: Backend + ?Sized> DownloadCapturer<'a, B> {
    pub fn new(
        backend: &'a B,
        policy: RetryPolicy,
        timeouts: CaptureTimeouts,
        extensions: Vec<String>,
    ) -> Self {
        Self {
            backend,
            policy,
            timeouts,
            extensions,
        }
    }

    /// Capture the file offered by the page into `destination`, trying
    /// [`Channel::ORDER`] until one succeeds.
    pub async fn capture(&self, spec: &SelectorSpec, destination: &Path) -> DownloadResult {
        let partial = partial_path(destination);
        if let Some(parent) = destination.parent()
            && let Err(e) = tokio::fs::create_dir_all(parent).await
        {
            return failed(
                Channel::ExpectDownloadEvent,
                destination,
                format!("cannot create {}: {}", parent.display(), e),
            );
        }

        let mut causes = Vec::new();
        let mut last_channel = Channel::ExpectDownloadEvent;

        for channel in Channel::ORDER {
            last_channel = channel;
            let result = match self.try_channel(channel, spec, &partial).await {
                Ok(()) => promote(&partial, destination).await,
                Err(cause) => Err(cause),
            };

            match result {
                Ok(byte_size) => {
                    info!(
                        "Captured {} ({} bytes) via {}",
                        destination.display(),
                        byte_size,
                        channel
                    );
                    return DownloadResult {
                        channel,
                        destination: destination.to_path_buf(),
                        byte_size,
                        outcome: Outcome::Success,
                    };
                }
                Err(cause) => {
                    debug!("{} failed: {}", channel, cause);
                    discard(&partial).await;
                    causes.push(format!("{}: {}", channel, cause));
                }
            }
        }

        warn!("All download channels failed for {}", destination.display());
        failed(last_channel, destination, causes.join("; "))
    }

    async fn try_channel(&self, channel: Channel, spec: &SelectorSpec, partial: &Path) -> Result<(), String> {
        match channel {
            Channel::ExpectDownloadEvent => {
                let triggers = spec
                    .structural_candidates
                    .iter()
                    .map(|s| Trigger::Selector(s.clone()));
                self.download_via(triggers, partial, self.timeouts.download_event)
                    .await
            }
            Channel::FallbackTextTrigger => {
                let triggers = spec.text_aliases.iter().map(|t| Trigger::Text(t.clone()));
                self.download_via(triggers, partial, self.timeouts.fallback_download)
                    .await
            }
            Channel::DirectLinkFetch => self.fetch_link(partial).await,
        }
    }

    async fn download_via(
        &self,
        triggers: impl Iterator<Item = Trigger>,
        partial: &Path,
        timeout: Duration,
    ) -> Result<(), String> {
        let backend = self.backend;
        let mut last_error = "no download triggers configured".to_string();

        for trigger in triggers {
            let trigger = &trigger;
            let op = format!("download via {}", trigger);
            match with_retry(&self.policy, &op, move || async move {
                tokio::time::timeout(timeout, backend.download(trigger, partial, timeout))
                    .await
                    .map_err(|_| {
                        BackendError::Timeout(format!("no download after {} within {:?}", trigger, timeout))
                    })?
            })
            .await
            {
                Ok(_) => return Ok(()),
                Err(e) => last_error = e.to_string(),
            }
        }
        Err(last_error)
    }

    async fn fetch_link(&self, partial: &Path) -> Result<(), String> {
        let backend = self.backend;
        let extensions = self.extensions.as_slice();

        let href = with_retry(&self.policy, "find data link", move || {
            backend.find_data_link(extensions)
        })
        .await
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("no link ending in {}", extensions.join("/")))?;

        let href = href.as_str();
        let op = format!("fetch {}", href);
        let body = tokio::time::timeout(
            self.timeouts.link_fetch,
            with_retry(&self.policy, &op, move || backend.fetch_text(href)),
        )
        .await
        .map_err(|_| format!("fetching {} timed out", href))?
        .map_err(|e| e.to_string())?;

        tokio::fs::write(partial, body.as_bytes())
            .await
            .map_err(|e| format!("cannot write {}: {}", partial.display(), e))
    }
}

/// `table.csv` -> `table.csv.part`
pub fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    destination.with_file_name(name)
}

async fn promote(partial: &Path, destination: &Path) -> Result<u64, String> {
    tokio::fs::rename(partial, destination)
        .await
        .map_err(|e| format!("cannot move capture into place: {}", e))?;
    let metadata = tokio::fs::metadata(destination)
        .await
        .map_err(|e| format!("cannot stat {}: {}", destination.display(), e))?;
    Ok(metadata.len())
}

async fn discard(partial: &Path) {
    if let Err(e) = tokio::fs::remove_file(partial).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!("Failed to remove {}: {}", partial.display(), e);
    }
}

fn failed(channel: Channel, destination: &Path, cause: String) -> DownloadResult {
    DownloadResult {
        channel,
        destination: destination.to_path_buf(),
        byte_size: 0,
        outcome: Outcome::Failure(cause),
    }
}

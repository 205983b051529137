use crate::cdp::CdpClient;
use crate::dom;
use async_trait::async_trait;
use chromiumoxide::Page;
use chromiumoxide::cdp::browser_protocol::browser::{DownloadProgressState, EventDownloadProgress};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tally_engine::backend::{Backend, BackendError, NavigationResult};
use tally_engine::common::{OptionMatch, Trigger, same_label};
use tracing::{debug, info};

/// Upper bound for a single page script.
const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(10);

pub struct HeadlessBackend {
    client: Option<CdpClient>,
    visible: bool,
    step_timeout: Duration,
    hits: AtomicU64,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::new_with_visibility(false)
    }

    pub fn new_with_visibility(visible: bool) -> Self {
        Self {
            client: None,
            visible,
            step_timeout: DEFAULT_STEP_TIMEOUT,
            hits: AtomicU64::new(0),
        }
    }

    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = timeout;
        self
    }

    fn page(&self) -> Result<&Page, BackendError> {
        Ok(&self.client.as_ref().ok_or(BackendError::NotReady)?.page)
    }

    async fn eval(&self, expression: &str) -> Result<Value, BackendError> {
        dom::evaluate(self.page()?, expression, false, self.step_timeout).await
    }

    /// Run a snippet that reports `'ok'` or a short failure code.
    async fn eval_status(&self, expression: &str, selector: &str, wanted: &str) -> Result<(), BackendError> {
        let status = self.eval(expression).await?;
        match status.as_str() {
            Some("ok") => Ok(()),
            Some("missing") => Err(BackendError::ElementNotFound(selector.to_string())),
            Some("not-select") => Err(BackendError::ElementNotFound(format!(
                "{} is not a <select>",
                selector
            ))),
            Some("no-option") => Err(BackendError::ElementNotFound(format!(
                "option '{}' in {}",
                wanted, selector
            ))),
            _ => Err(BackendError::Script(format!("unexpected result {}", status))),
        }
    }

    async fn get_navigation_result(&self, page: &Page) -> Result<NavigationResult, BackendError> {
        let title = page
            .get_title()
            .await
            .unwrap_or_default()
            .unwrap_or_default();
        let url = page
            .url()
            .await
            .map_err(|e| BackendError::Navigation(e.to_string()))?
            .unwrap_or_default();
        let status = match self.eval(dom::NAVIGATION_STATUS).await?.as_u64() {
            Some(code) if code > 0 => code as u16,
            _ => 200,
        };
        Ok(NavigationResult { url, title, status })
    }

    async fn click_trigger(&self, trigger: &Trigger) -> Result<(), BackendError> {
        match trigger {
            Trigger::Selector(selector) => self.click(selector).await,
            Trigger::Text(text) => self.click_text(text).await,
        }
    }
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Deserialize)]
struct FetchReply {
    ok: bool,
    status: u16,
    #[serde(default)]
    body: String,
}

#[async_trait]
impl Backend for HeadlessBackend {
    async fn launch(&mut self) -> Result<(), BackendError> {
        info!("Launching Headless Backend (Chromium)...");
        let client = CdpClient::launch(self.visible)
            .await
            .map_err(|e| BackendError::Other(e.to_string()))?;
        self.client = Some(client);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), BackendError> {
        if let Some(client) = self.client.take() {
            client
                .close()
                .await
                .map_err(|e| BackendError::Other(e.to_string()))?;
        }
        Ok(())
    }

    async fn is_ready(&self) -> bool {
        self.client.is_some()
    }

    async fn navigate(&self, url: &str) -> Result<NavigationResult, BackendError> {
        let page = self.page()?;

        info!("Navigating to: {}", url);
        page.goto(url)
            .await
            .map_err(|e| BackendError::Navigation(e.to_string()))?;

        self.get_navigation_result(page).await
    }

    async fn fill(&self, selector: &str, text: &str) -> Result<(), BackendError> {
        self.eval_status(&dom::fill(selector, text), selector, text)
            .await
    }

    async fn click(&self, selector: &str) -> Result<(), BackendError> {
        let element = self
            .page()?
            .find_element(selector)
            .await
            .map_err(|_| BackendError::ElementNotFound(selector.to_string()))?;
        element
            .click()
            .await
            .map_err(|e| BackendError::Other(format!("click on {} failed: {}", selector, e)))?;
        Ok(())
    }

    async fn click_text(&self, text: &str) -> Result<(), BackendError> {
        let token = self.hits.fetch_add(1, Ordering::Relaxed);
        let marked = self.eval(&dom::mark_text(text, token)).await?;
        if marked.is_null() {
            return Err(BackendError::ElementNotFound(format!("text \"{}\"", text)));
        }
        self.click(&format!("[{}='{}']", dom::HIT_ATTRIBUTE, token))
            .await
    }

    async fn select_by_label(&self, selector: &str, label: &str) -> Result<(), BackendError> {
        self.eval_status(&dom::select(selector, label, false), selector, label)
            .await
    }

    async fn select_by_value(&self, selector: &str, value: &str) -> Result<(), BackendError> {
        self.eval_status(&dom::select(selector, value, true), selector, value)
            .await
    }

    async fn find_option(
        &self,
        selector: &str,
        text: &str,
    ) -> Result<Option<OptionMatch>, BackendError> {
        let options = self.list_options(selector).await?;
        Ok(options
            .into_iter()
            .find(|o| same_label(&o.label, text)))
    }

    async fn list_options(&self, selector: &str) -> Result<Vec<OptionMatch>, BackendError> {
        let value = self.eval(&dom::list_options(selector)).await?;
        if value.is_null() {
            return Err(BackendError::ElementNotFound(selector.to_string()));
        }
        Ok(serde_json::from_value(value)?)
    }

    async fn download(
        &self,
        trigger: &Trigger,
        destination: &Path,
        timeout: Duration,
    ) -> Result<u64, BackendError> {
        let client = self.client.as_ref().ok_or(BackendError::NotReady)?;
        let mut progress = client
            .page
            .event_listener::<EventDownloadProgress>()
            .await
            .map_err(|e| BackendError::Download(format!("cannot watch downloads: {}", e)))?;

        self.click_trigger(trigger).await?;

        let finished = tokio::time::timeout(timeout, async {
            while let Some(event) = progress.next().await {
                match event.state {
                    DownloadProgressState::Completed => return Ok(event.guid.clone()),
                    DownloadProgressState::Canceled => {
                        return Err(BackendError::Download("download was canceled".into()));
                    }
                    DownloadProgressState::InProgress => {}
                }
            }
            Err(BackendError::Download("download events ended".into()))
        })
        .await;

        let guid = match finished {
            Ok(result) => result?,
            Err(_) => {
                return Err(BackendError::Timeout(format!(
                    "no download after {} within {:?}",
                    trigger, timeout
                )));
            }
        };

        let saved = client.download_dir().join(&guid);
        debug!("Download {} completed, moving to {}", guid, destination.display());
        if tokio::fs::rename(&saved, destination).await.is_err() {
            tokio::fs::copy(&saved, destination).await?;
            tokio::fs::remove_file(&saved).await?;
        }
        Ok(tokio::fs::metadata(destination).await?.len())
    }

    async fn find_data_link(&self, extensions: &[String]) -> Result<Option<String>, BackendError> {
        let hrefs: Vec<String> = serde_json::from_value(self.eval(dom::ANCHOR_HREFS).await?)?;
        Ok(hrefs
            .into_iter()
            .find(|href| dom::is_data_link(href, extensions)))
    }

    async fn fetch_text(&self, href: &str) -> Result<String, BackendError> {
        let value =
            dom::evaluate(self.page()?, &dom::fetch_text(href), true, self.step_timeout).await?;
        let reply: FetchReply = serde_json::from_value(value)?;
        if !reply.ok {
            return Err(BackendError::Download(format!(
                "{} answered {}",
                href, reply.status
            )));
        }
        Ok(reply.body)
    }
}

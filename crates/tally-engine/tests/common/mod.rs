//! Scripted in-memory page used by the resolver, capturer and browser-source tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tally_engine::backend::{Backend, BackendError, NavigationResult};
use tally_engine::config::TallyConfig;
use tally_engine::common::{OptionMatch, Trigger, same_label};

#[derive(Debug, Default)]
struct PageState {
    /// Native `<select>` elements by selector.
    selects: HashMap<String, Vec<OptionMatch>>,
    /// Selector -> label of the chosen option.
    selected: HashMap<String, String>,
    /// Custom widgets: clicking the selector reveals the texts.
    widgets: HashMap<String, Vec<String>>,
    /// Texts clickable without opening anything.
    visible_texts: Vec<String>,
    /// Texts revealed by the last opened widget.
    open_texts: Vec<String>,
    clicked_texts: Vec<String>,
    buttons: Vec<String>,
    fields: HashMap<String, String>,
    download_selectors: HashMap<String, Vec<u8>>,
    download_texts: HashMap<String, String>,
    links: Vec<(String, String)>,
    /// Operation key -> number of upcoming calls that fail.
    flaky: HashMap<String, u32>,
    /// Operation key -> how long the call hangs before doing anything.
    stalls: HashMap<String, Duration>,
    navigations: Vec<String>,
    status: u16,
    calls: Vec<String>,
}

#[derive(Debug)]
pub struct FakePage {
    state: Mutex<PageState>,
}

impl FakePage {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PageState {
                status: 200,
                ..Default::default()
            }),
        }
    }

    pub fn with_select(self, selector: &str, options: &[(&str, &str)]) -> Self {
        let options = options
            .iter()
            .map(|(label, value)| OptionMatch {
                label: label.to_string(),
                value: Some(value.to_string()),
            })
            .collect();
        self.state
            .lock()
            .unwrap()
            .selects
            .insert(selector.to_string(), options);
        self
    }

    pub fn with_widget(self, selector: &str, texts: &[&str]) -> Self {
        self.state.lock().unwrap().widgets.insert(
            selector.to_string(),
            texts.iter().map(|t| t.to_string()).collect(),
        );
        self
    }

    pub fn with_visible_text(self, text: &str) -> Self {
        self.state.lock().unwrap().visible_texts.push(text.to_string());
        self
    }

    pub fn with_button(self, selector: &str) -> Self {
        self.state.lock().unwrap().buttons.push(selector.to_string());
        self
    }

    pub fn with_field(self, selector: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .fields
            .insert(selector.to_string(), String::new());
        self
    }

    pub fn with_download_button(self, selector: &str, body: &str) -> Self {
        self.with_download_bytes(selector, body.as_bytes())
    }

    pub fn with_download_bytes(self, selector: &str, body: &[u8]) -> Self {
        self.state
            .lock()
            .unwrap()
            .download_selectors
            .insert(selector.to_string(), body.to_vec());
        self
    }

    pub fn with_download_text(self, text: &str, body: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .download_texts
            .insert(text.to_string(), body.to_string());
        self
    }

    pub fn with_link(self, href: &str, body: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .links
            .push((href.to_string(), body.to_string()));
        self
    }

    /// Make the next `times` calls of `operation` (e.g. `"select_by_label:#risk"`) fail.
    pub fn flaky(self, operation: &str, times: u32) -> Self {
        self.state
            .lock()
            .unwrap()
            .flaky
            .insert(operation.to_string(), times);
        self
    }

    /// Make every call of `operation` hang for `delay` first.
    pub fn stall(self, operation: &str, delay: Duration) -> Self {
        self.state
            .lock()
            .unwrap()
            .stalls
            .insert(operation.to_string(), delay);
        self
    }

    pub fn with_status(self, status: u16) -> Self {
        self.state.lock().unwrap().status = status;
        self
    }

    pub fn selected(&self, selector: &str) -> Option<String> {
        self.state.lock().unwrap().selected.get(selector).cloned()
    }

    pub fn field(&self, selector: &str) -> Option<String> {
        self.state.lock().unwrap().fields.get(selector).cloned()
    }

    pub fn clicked_texts(&self) -> Vec<String> {
        self.state.lock().unwrap().clicked_texts.clone()
    }

    pub fn navigations(&self) -> Vec<String> {
        self.state.lock().unwrap().navigations.clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count_calls(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    async fn hang_if_stalled(&self, operation: &str, arg: &str) {
        let delay = self
            .state
            .lock()
            .unwrap()
            .stalls
            .get(&format!("{}:{}", operation, arg))
            .copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn enter(&self, operation: &str, arg: &str) -> Result<std::sync::MutexGuard<'_, PageState>, BackendError> {
        let mut state = self.state.lock().unwrap();
        let key = format!("{}:{}", operation, arg);
        state.calls.push(key.clone());
        if let Some(remaining) = state.flaky.get_mut(&key)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(BackendError::Timeout(format!("{} (flaky)", key)));
        }
        Ok(state)
    }
}

fn text_matches(candidate: &str, wanted: &str) -> bool {
    candidate
        .trim()
        .to_lowercase()
        .contains(&wanted.trim().to_lowercase())
}

fn write_body(destination: &Path, body: &[u8]) -> Result<u64, BackendError> {
    std::fs::write(destination, body)?;
    Ok(body.len() as u64)
}

#[async_trait]
impl Backend for FakePage {
    async fn launch(&mut self) -> Result<(), BackendError> {
        Ok(())
    }

    async fn close(&mut self) -> Result<(), BackendError> {
        Ok(())
    }

    async fn is_ready(&self) -> bool {
        true
    }

    async fn navigate(&self, url: &str) -> Result<NavigationResult, BackendError> {
        let mut state = self.enter("navigate", url)?;
        state.navigations.push(url.to_string());
        state.open_texts.clear();
        Ok(NavigationResult {
            url: url.to_string(),
            title: "Backtesting".to_string(),
            status: state.status,
        })
    }

    async fn fill(&self, selector: &str, text: &str) -> Result<(), BackendError> {
        let mut state = self.enter("fill", selector)?;
        match state.fields.get_mut(selector) {
            Some(value) => {
                *value = text.to_string();
                Ok(())
            }
            None => Err(BackendError::ElementNotFound(selector.to_string())),
        }
    }

    async fn click(&self, selector: &str) -> Result<(), BackendError> {
        let mut state = self.enter("click", selector)?;
        if let Some(texts) = state.widgets.get(selector).cloned() {
            state.open_texts = texts;
            return Ok(());
        }
        if state.buttons.iter().any(|b| b == selector)
            || state.selects.contains_key(selector)
            || state.download_selectors.contains_key(selector)
        {
            return Ok(());
        }
        Err(BackendError::ElementNotFound(selector.to_string()))
    }

    async fn click_text(&self, text: &str) -> Result<(), BackendError> {
        let mut state = self.enter("click_text", text)?;
        let hit = state
            .visible_texts
            .iter()
            .chain(state.open_texts.iter())
            .find(|candidate| text_matches(candidate, text))
            .cloned();
        match hit {
            Some(hit) => {
                state.clicked_texts.push(hit);
                state.open_texts.clear();
                Ok(())
            }
            None => Err(BackendError::ElementNotFound(format!("text '{}'", text))),
        }
    }

    async fn select_by_label(&self, selector: &str, label: &str) -> Result<(), BackendError> {
        let mut state = self.enter("select_by_label", selector)?;
        let options = state
            .selects
            .get(selector)
            .ok_or_else(|| BackendError::ElementNotFound(selector.to_string()))?;
        let option = options
            .iter()
            .find(|o| o.label == label)
            .cloned()
            .ok_or_else(|| BackendError::ElementNotFound(format!("option '{}' in {}", label, selector)))?;
        state.selected.insert(selector.to_string(), option.label);
        Ok(())
    }

    async fn select_by_value(&self, selector: &str, value: &str) -> Result<(), BackendError> {
        let mut state = self.enter("select_by_value", selector)?;
        let options = state
            .selects
            .get(selector)
            .ok_or_else(|| BackendError::ElementNotFound(selector.to_string()))?;
        let option = options
            .iter()
            .find(|o| o.value.as_deref() == Some(value))
            .cloned()
            .ok_or_else(|| BackendError::ElementNotFound(format!("value '{}' in {}", value, selector)))?;
        state.selected.insert(selector.to_string(), option.label);
        Ok(())
    }

    async fn find_option(
        &self,
        selector: &str,
        text: &str,
    ) -> Result<Option<OptionMatch>, BackendError> {
        let state = self.enter("find_option", selector)?;
        let options = state
            .selects
            .get(selector)
            .ok_or_else(|| BackendError::ElementNotFound(selector.to_string()))?;
        Ok(options
            .iter()
            .find(|o| same_label(&o.label, text))
            .cloned())
    }

    async fn list_options(&self, selector: &str) -> Result<Vec<OptionMatch>, BackendError> {
        let state = self.enter("list_options", selector)?;
        state
            .selects
            .get(selector)
            .cloned()
            .ok_or_else(|| BackendError::ElementNotFound(selector.to_string()))
    }

    async fn download(
        &self,
        trigger: &Trigger,
        destination: &Path,
        _timeout: Duration,
    ) -> Result<u64, BackendError> {
        self.hang_if_stalled("download", &trigger.to_string()).await;
        let state = self.enter("download", &trigger.to_string())?;
        let body = match trigger {
            Trigger::Selector(selector) => state.download_selectors.get(selector).cloned(),
            Trigger::Text(text) => state
                .download_texts
                .iter()
                .find(|(label, _)| text_matches(label, text))
                .map(|(_, body)| body.clone().into_bytes()),
        };
        match body {
            Some(body) => write_body(destination, &body),
            None => Err(BackendError::Timeout(format!("no download after {}", trigger))),
        }
    }

    async fn find_data_link(&self, extensions: &[String]) -> Result<Option<String>, BackendError> {
        let state = self.enter("find_data_link", "")?;
        Ok(state
            .links
            .iter()
            .map(|(href, _)| href)
            .find(|href| {
                let path = href.split(['?', '#']).next().unwrap_or_default().to_lowercase();
                extensions.iter().any(|ext| path.ends_with(&ext.to_lowercase()))
            })
            .cloned())
    }

    async fn fetch_text(&self, href: &str) -> Result<String, BackendError> {
        self.hang_if_stalled("fetch_text", href).await;
        let state = self.enter("fetch_text", href)?;
        state
            .links
            .iter()
            .find(|(h, _)| h == href)
            .map(|(_, body)| body.clone())
            .ok_or_else(|| BackendError::Navigation(format!("404 {}", href)))
    }
}

/// Default configuration without retry pauses.
pub fn fast_config() -> TallyConfig {
    let mut config = TallyConfig::default();
    config.retry.max_attempts = 2;
    config.retry.delay_ms = 0;
    config
}

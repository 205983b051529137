use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
pub use tally_common::error::BackendError;
use tally_common::{OptionMatch, Trigger};

#[derive(Debug, Clone)]
pub struct NavigationResult {
    pub url: String,
    pub title: String,
    pub status: u16,
}

impl NavigationResult {
    pub fn is_success(&self) -> bool {
        self.status < 400
    }
}

/// Browser driver used by the resolver, the capturer and the browser source.
///
/// Interaction methods take `&self` so a single page handle can be shared by
/// the components of one run; implementations keep their own interior state.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Launch the backend (start browser, connect to remote, etc.)
    async fn launch(&mut self) -> Result<(), BackendError>;

    /// Close the backend and cleanup resources.
    async fn close(&mut self) -> Result<(), BackendError>;

    /// Check if the backend is ready to accept commands.
    async fn is_ready(&self) -> bool;

    /// Navigate to a specific URL and wait for the load to finish.
    async fn navigate(&self, url: &str) -> Result<NavigationResult, BackendError>;

    /// Replace the value of an input field.
    async fn fill(&self, selector: &str, text: &str) -> Result<(), BackendError>;

    /// Click the first element matching a CSS selector.
    async fn click(&self, selector: &str) -> Result<(), BackendError>;

    /// Click the innermost visible element whose text contains `text`,
    /// case-insensitively. Exact text matches win over substrings.
    async fn click_text(&self, text: &str) -> Result<(), BackendError>;

    /// Select the option of a native `<select>` whose visible label is exactly `label`.
    async fn select_by_label(&self, selector: &str, label: &str) -> Result<(), BackendError>;

    /// Select the option of a native `<select>` by its `value` attribute.
    async fn select_by_value(&self, selector: &str, value: &str) -> Result<(), BackendError>;

    /// Look for an option inside the element whose text matches `text`
    /// case-insensitively. `Ok(None)` means the element exists but has no such option.
    async fn find_option(
        &self,
        selector: &str,
        text: &str,
    ) -> Result<Option<OptionMatch>, BackendError>;

    /// All options of the element, in document order.
    async fn list_options(&self, _selector: &str) -> Result<Vec<OptionMatch>, BackendError> {
        Err(BackendError::NotSupported("list_options".into()))
    }

    /// Click `trigger`, wait for the browser download it starts and store the
    /// file at `destination`. Returns the number of bytes written.
    async fn download(
        &self,
        trigger: &Trigger,
        destination: &Path,
        timeout: Duration,
    ) -> Result<u64, BackendError>;

    /// Absolute href of the first anchor whose path ends in one of `extensions`.
    async fn find_data_link(&self, _extensions: &[String]) -> Result<Option<String>, BackendError> {
        Err(BackendError::NotSupported("find_data_link".into()))
    }

    /// Fetch `href` from inside the page, sending the session cookies, and
    /// return the response body as text.
    async fn fetch_text(&self, _href: &str) -> Result<String, BackendError> {
        Err(BackendError::NotSupported("fetch_text".into()))
    }
}

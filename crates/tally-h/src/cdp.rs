use chromiumoxide::cdp::browser_protocol::browser::{
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::cdp::browser_protocol::page::{
    EventJavascriptDialogOpening, HandleJavaScriptDialogParams,
};
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::task::JoinHandle;

type LaunchError = Box<dyn std::error::Error + Send + Sync>;

/// One Chromium process with a single page and a private profile whose
/// `downloads/` folder receives every file the page downloads.
pub struct CdpClient {
    pub browser: Browser,
    pub handler_task: JoinHandle<()>,
    pub page: Page,
    profile: Profile,
}

struct Profile {
    dir: PathBuf,
    temporary: bool,
}

impl CdpClient {
    pub async fn launch(visible: bool) -> Result<Self, LaunchError> {
        let profile = Profile::resolve()?;
        let config = browser_config(visible, &profile.dir)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| format!("Failed to launch browser: {}", e))?;
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!("Browser handler error (ignoring): {}", e);
                }
            }
            tracing::debug!("Browser handler task ended");
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| format!("Failed to create page: {}", e))?;

        let downloads = profile.downloads();
        std::fs::create_dir_all(&downloads)?;
        route_downloads(&page, &downloads).await?;
        accept_dialogs(&page).await?;

        Ok(Self {
            browser,
            handler_task,
            page,
            profile,
        })
    }

    /// Directory the browser saves downloads into, one file per download GUID.
    pub fn download_dir(&self) -> PathBuf {
        self.profile.downloads()
    }

    pub async fn close(mut self) -> Result<(), LaunchError> {
        self.browser
            .close()
            .await
            .map_err(|e| format!("Error closing browser: {}", e))?;
        self.handler_task
            .await
            .map_err(|e| format!("Error awaiting handler: {}", e))?;
        self.profile.discard();
        Ok(())
    }
}

impl Profile {
    /// `TALLY_USER_DATA_DIR` is kept after the run; otherwise a fresh
    /// temporary profile is created and removed on close.
    fn resolve() -> Result<Self, LaunchError> {
        if let Ok(dir) = std::env::var("TALLY_USER_DATA_DIR") {
            let dir = PathBuf::from(dir);
            std::fs::create_dir_all(&dir)?;
            tracing::info!("Using browser profile {}", dir.display());
            return Ok(Self {
                dir,
                temporary: false,
            });
        }

        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| format!("System clock error: {}", e))?
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("tally-profile-{}-{}", std::process::id(), stamp));
        std::fs::create_dir_all(&dir)?;
        tracing::debug!("Using temporary browser profile {}", dir.display());
        Ok(Self {
            dir,
            temporary: true,
        })
    }

    fn downloads(&self) -> PathBuf {
        self.dir.join("downloads")
    }

    fn discard(&self) {
        if self.temporary
            && let Err(e) = std::fs::remove_dir_all(&self.dir)
        {
            tracing::debug!("Failed to remove profile {}: {}", self.dir.display(), e);
        }
    }
}

fn browser_config(visible: bool, profile: &Path) -> Result<BrowserConfig, LaunchError> {
    let mut builder = BrowserConfig::builder().no_sandbox().user_data_dir(profile);

    if visible {
        tracing::info!("Launching browser in visible mode");
        builder = builder.with_head();
    } else {
        tracing::info!("Launching browser in headless mode");
    }
    if let Ok(chrome_bin) = std::env::var("CHROME_BIN") {
        tracing::info!("Using custom Chrome binary: {}", chrome_bin);
        builder = builder.chrome_executable(chrome_bin);
    }

    Ok(builder
        .build()
        .map_err(|e| format!("Failed to build browser config: {}", e))?)
}

/// Save downloads under `dir` named by their GUID and emit progress events.
async fn route_downloads(page: &Page, dir: &Path) -> Result<(), LaunchError> {
    let params = SetDownloadBehaviorParams::builder()
        .behavior(SetDownloadBehaviorBehavior::AllowAndName)
        .download_path(dir.to_string_lossy().to_string())
        .events_enabled(true)
        .build()
        .map_err(|e| format!("Failed to build download behavior: {}", e))?;

    page.execute(params)
        .await
        .map_err(|e| format!("Failed to enable downloads: {}", e))?;
    tracing::debug!("Downloads go to {}", dir.display());
    Ok(())
}

/// Auto-accept JavaScript dialogs.
async fn accept_dialogs(page: &Page) -> Result<(), LaunchError> {
    let mut dialogs = page
        .event_listener::<EventJavascriptDialogOpening>()
        .await
        .map_err(|e| format!("Failed to subscribe to dialog events: {}", e))?;

    let page = page.clone();
    tokio::spawn(async move {
        while let Some(event) = dialogs.next().await {
            tracing::info!("Accepting JavaScript dialog: {}", event.message);
            if let Err(e) = page.execute(HandleJavaScriptDialogParams::new(true)).await {
                tracing::warn!("Failed to accept dialog: {}", e);
            }
        }
    });
    Ok(())
}

use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tally_common::{RiskLevel, SelectorRegistry, SelectorSpec, Target, same_label};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TallyConfig {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default = "default_selectors")]
    pub selectors: Vec<SelectorSpec>,
    /// Canonical risk key -> labels the site may show for it, tried in order.
    #[serde(default = "default_risk_aliases")]
    pub risk_aliases: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub login: LoginConfig,
    /// Option labels that are prompts rather than values ("Selecciona una hora").
    #[serde(default = "default_placeholders")]
    pub placeholders: Vec<String>,
    #[serde(default = "default_data_extensions")]
    pub data_extensions: Vec<String>,
    #[serde(default)]
    pub output: OutputConfig,
}

impl Default for TallyConfig {
    fn default() -> Self {
        Self {
            site: SiteConfig::default(),
            retry: RetryConfig::default(),
            timeouts: TimeoutConfig::default(),
            selectors: default_selectors(),
            risk_aliases: default_risk_aliases(),
            login: LoginConfig::default(),
            placeholders: default_placeholders(),
            data_extensions: default_data_extensions(),
            output: OutputConfig::default(),
        }
    }
}

impl TallyConfig {
    pub fn registry(&self) -> SelectorRegistry {
        SelectorRegistry::new(self.selectors.iter().cloned())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.max_attempts,
            Duration::from_millis(self.retry.delay_ms),
        )
    }

    /// Labels to try for a risk level: configured aliases first, then the
    /// title-cased key and the raw key. Repeats are dropped, ignoring case.
    pub fn risk_labels(&self, risk: &RiskLevel) -> Vec<String> {
        let configured = self
            .risk_aliases
            .get(risk.as_str())
            .cloned()
            .unwrap_or_default();

        let mut labels: Vec<String> = Vec::new();
        for label in configured
            .into_iter()
            .chain([risk.display_label(), risk.as_str().to_string()])
        {
            let label = label.trim().to_string();
            if !label.is_empty() && !labels.iter().any(|l| same_label(l, &label)) {
                labels.push(label);
            }
        }
        labels
    }

    pub fn is_placeholder(&self, label: &str) -> bool {
        let label = label.trim();
        label.is_empty() || self.placeholders.iter().any(|p| same_label(p, label))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_login_path")]
    pub login_path: String,
    #[serde(default = "default_landing_path")]
    pub landing_path: String,
    #[serde(default = "default_data_path")]
    pub data_path: String,
    #[serde(default = "default_dates_path")]
    pub dates_path: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            login_path: default_login_path(),
            landing_path: default_landing_path(),
            data_path: default_data_path(),
            dates_path: default_dates_path(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_base_url() -> String {
    "https://backtestingmarket.com".to_string()
}

fn default_login_path() -> String {
    "/login".to_string()
}

fn default_landing_path() -> String {
    "/backtestingIdea".to_string()
}

fn default_data_path() -> String {
    "/backtestingIdea/get_backtesting_idea".to_string()
}

fn default_dates_path() -> String {
    "/get_dates".to_string()
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Safari/537.36"
        .to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: default_retry_delay_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    2000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_step_timeout_ms")]
    pub step_ms: u64,
    #[serde(default = "default_download_event_ms")]
    pub download_event_ms: u64,
    #[serde(default = "default_fallback_download_ms")]
    pub fallback_download_ms: u64,
    #[serde(default = "default_link_fetch_ms")]
    pub link_fetch_ms: u64,
    #[serde(default = "default_request_ms")]
    pub request_ms: u64,
}

impl TimeoutConfig {
    pub fn step(&self) -> Duration {
        Duration::from_millis(self.step_ms)
    }

    pub fn request(&self) -> Duration {
        Duration::from_millis(self.request_ms)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            step_ms: default_step_timeout_ms(),
            download_event_ms: default_download_event_ms(),
            fallback_download_ms: default_fallback_download_ms(),
            link_fetch_ms: default_link_fetch_ms(),
            request_ms: default_request_ms(),
        }
    }
}

fn default_step_timeout_ms() -> u64 {
    10000
}

fn default_download_event_ms() -> u64 {
    30000
}

fn default_fallback_download_ms() -> u64 {
    20000
}

fn default_link_fetch_ms() -> u64 {
    30000
}

fn default_request_ms() -> u64 {
    120000
}

/// Locators for the browser login form and, optionally, the date inputs of
/// the backtest page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginConfig {
    #[serde(default = "default_email_selectors")]
    pub email_selectors: Vec<String>,
    #[serde(default = "default_password_selectors")]
    pub password_selectors: Vec<String>,
    #[serde(default = "default_submit_selectors")]
    pub submit_selectors: Vec<String>,
    #[serde(default = "default_submit_texts")]
    pub submit_texts: Vec<String>,
    #[serde(default)]
    pub date_from_selectors: Vec<String>,
    #[serde(default)]
    pub date_to_selectors: Vec<String>,
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            email_selectors: default_email_selectors(),
            password_selectors: default_password_selectors(),
            submit_selectors: default_submit_selectors(),
            submit_texts: default_submit_texts(),
            date_from_selectors: Vec::new(),
            date_to_selectors: Vec::new(),
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn default_email_selectors() -> Vec<String> {
    strings(&["input[name='email']", "input[type='email']", "#email"])
}

fn default_password_selectors() -> Vec<String> {
    strings(&["input[name='password']", "input[type='password']", "#password"])
}

fn default_submit_selectors() -> Vec<String> {
    strings(&["button[type='submit']", "input[type='submit']"])
}

fn default_submit_texts() -> Vec<String> {
    strings(&["Iniciar sesión", "Ingresar", "Entrar", "Login", "Sign in"])
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Write a zero-byte file when the data source returns no rows.
    #[serde(default)]
    pub write_empty: bool,
}

fn default_selectors() -> Vec<SelectorSpec> {
    vec![
        SelectorSpec::new(
            Target::Risk,
            [
                "#risk",
                "select[name='risk']",
                "[data-field='risk']",
                ".risk-select",
            ],
            ["Riesgo", "Risk"],
        ),
        SelectorSpec::new(
            Target::Time,
            [
                "#timeHour",
                "select[name='timeHour']",
                "[data-field='timeHour']",
                ".time-select",
            ],
            ["Hora", "Horario", "Time", "Hour"],
        ),
        SelectorSpec::new(
            Target::Download,
            [
                "#downloadCsv",
                "button.buttons-csv",
                "a.buttons-csv",
                "[data-action='download']",
            ],
            ["CSV", "Descargar", "Download", "Exportar", "Export"],
        ),
    ]
}

fn default_risk_aliases() -> BTreeMap<String, Vec<String>> {
    BTreeMap::from([
        (
            "conservador".to_string(),
            strings(&["Conservador", "Conservative"]),
        ),
        (
            "conservative".to_string(),
            strings(&["Conservative", "Conservador"]),
        ),
        (
            "intermedio".to_string(),
            strings(&["Intermedio", "Intermediate", "Moderado", "Moderate"]),
        ),
        (
            "agresivo".to_string(),
            strings(&["Agresivo", "Aggressive"]),
        ),
        (
            "aggressive".to_string(),
            strings(&["Aggressive", "Agresivo"]),
        ),
        (
            "ultra_agresivo".to_string(),
            strings(&[
                "Ultra Agresivo",
                "Ultra_Agresivo",
                "Ultra-Agresivo",
                "Ultra Aggressive",
            ]),
        ),
    ])
}

fn default_placeholders() -> Vec<String> {
    strings(&[
        "selecciona",
        "selecciona una hora",
        "selecciona un riesgo",
        "select",
        "select an option",
    ])
}

fn default_data_extensions() -> Vec<String> {
    strings(&[".csv", ".tsv"])
}

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tally_engine::backend::Backend;
use tally_engine::config::{ConfigLoader, TallyConfig};
use tally_engine::harvest::{HarvestPlan, HarvestReport, Harvester, ListSpec};
use tally_engine::source::{ApiSource, BrowserSource, Credentials, DateRange};
use tally_h::HeadlessBackend;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tally", version, about = "Backtest table harvester")]
struct Args {
    #[command(subcommand)]
    mode: Mode,

    /// Ticker symbol
    #[arg(long, env = "TALLY_SYMBOL", default_value = "SPX")]
    symbol: String,

    /// Strategy name as shown on the site
    #[arg(long, env = "TALLY_STRATEGY", default_value = "Vertical")]
    strategy: String,

    /// Start date (YYYY-MM-DD); needs --to
    #[arg(long, env = "TALLY_FROM")]
    from: Option<String>,

    /// End date (YYYY-MM-DD); needs --from
    #[arg(long, env = "TALLY_TO")]
    to: Option<String>,

    /// Comma-separated risk levels, or "auto"
    #[arg(long, env = "TALLY_RISKS", default_value = "auto")]
    risks: String,

    /// Comma-separated time slots (HH:MM or HHMM), or "auto"
    #[arg(long, env = "TALLY_HOURS", default_value = "auto")]
    hours: String,

    /// Output base directory
    #[arg(long, env = "TALLY_OUT_BASE", default_value = "data")]
    out_base: PathBuf,

    /// Refetch tables that already exist
    #[arg(long, env = "TALLY_OVERWRITE")]
    overwrite: bool,

    /// Seconds to wait between fetched pairs
    #[arg(long, env = "TALLY_PAUSE", default_value_t = 0.10)]
    pause: f64,

    /// Config file (defaults to ./tally.yaml, then ~/.tally/config.yaml)
    #[arg(long, env = "TALLY_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Mode {
    /// Log in over HTTP and read the JSON endpoint
    Api,
    /// Drive a Chromium page via CDP and capture downloads
    Headless {
        /// Launch browser in visible mode (not headless)
        #[arg(long)]
        visible: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout stays free for the summary line.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let credentials = Credentials::new(
        std::env::var("BTM_EMAIL").unwrap_or_default(),
        std::env::var("BTM_PASSWORD").unwrap_or_default(),
    );
    if !credentials.is_complete() {
        eprintln!("Missing BTM_EMAIL or BTM_PASSWORD in the environment");
        std::process::exit(1);
    }

    let mut config = match &args.config {
        Some(path) => ConfigLoader::load_from(path)
            .await
            .with_context(|| format!("loading {}", path.display()))?,
        None => ConfigLoader::load_default().await?,
    };
    if let Ok(base_url) = std::env::var("BTM_BASE_URL")
        && !base_url.trim().is_empty()
    {
        config.site.base_url = base_url.trim().to_string();
    }

    let plan = build_plan(&args)?;
    if let Some(path) = &args.config {
        info!("Using config {}", path.display());
    }

    let report = match args.mode {
        Mode::Api => {
            let source = ApiSource::new(&config)?;
            Harvester::new(source, plan).run(&credentials).await?
        }
        Mode::Headless { visible } => run_headless(visible, &config, plan, &credentials).await?,
    };

    println!(
        "{} -> {}",
        report.summary,
        report.manifest_path.display()
    );
    Ok(())
}

fn build_plan(args: &Args) -> anyhow::Result<HarvestPlan> {
    if args.from.is_some() != args.to.is_some() {
        warn!("--from and --to go together; using the site's full date range");
    }

    let mut plan = HarvestPlan::new(args.symbol.trim(), args.strategy.trim());
    plan.risks = ListSpec::parse(&args.risks);
    plan.hours = ListSpec::parse(&args.hours);
    plan.dates = DateRange::from_parts(args.from.as_deref(), args.to.as_deref());
    plan.out_base = args.out_base.clone();
    plan.overwrite = args.overwrite;
    plan.pause = Duration::try_from_secs_f64(args.pause.max(0.0))
        .with_context(|| format!("invalid --pause {}", args.pause))?;
    Ok(plan)
}

async fn run_headless(
    visible: bool,
    config: &TallyConfig,
    plan: HarvestPlan,
    credentials: &Credentials,
) -> anyhow::Result<HarvestReport> {
    let mut backend =
        HeadlessBackend::new_with_visibility(visible).with_step_timeout(config.timeouts.step());
    backend.launch().await.context("failed to launch browser")?;

    let result = Harvester::new(BrowserSource::new(&backend, config), plan)
        .run(credentials)
        .await;

    if let Err(e) = backend.close().await {
        warn!("Failed to close browser: {}", e);
    }
    Ok(result?)
}

mod common;

use common::{FakePage, fast_config};
use std::time::Duration;
use tally_engine::common::ManifestStatus;
use tally_engine::harvest::{HarvestError, HarvestPlan, Harvester, ListSpec};
use tally_engine::source::{BrowserSource, Credentials, SessionError, TableSource};

const TABLE: &str = "Date,Credit\n2024-01-02,1.5\n2024-01-03,-2\n";

fn site() -> FakePage {
    FakePage::new()
        .with_field("input[name='email']")
        .with_field("input[name='password']")
        .with_button("button[type='submit']")
        .with_select(
            "#risk",
            &[
                ("Selecciona un riesgo", ""),
                ("Conservador", "conservador"),
                ("Agresivo", "agresivo"),
            ],
        )
        .with_select(
            "#timeHour",
            &[
                ("Selecciona una hora", ""),
                ("09:40", "09:40"),
                ("10:00", "10:00"),
            ],
        )
        .with_download_button("#downloadCsv", TABLE)
}

fn plan(out_base: &std::path::Path) -> HarvestPlan {
    let mut plan = HarvestPlan::new("SPX", "Vertical");
    plan.out_base = out_base.to_path_buf();
    plan.pause = Duration::ZERO;
    plan
}

fn credentials() -> Credentials {
    Credentials::new("me@example.com", "secret")
}

#[tokio::test]
async fn test_login_fills_form_and_confirms_landing() {
    let page = site();
    let config = fast_config();
    let source = BrowserSource::new(&page, &config);

    source.login(&credentials()).await.unwrap();

    assert_eq!(page.field("input[name='email']").as_deref(), Some("me@example.com"));
    assert_eq!(page.field("input[name='password']").as_deref(), Some("secret"));
    assert_eq!(
        page.navigations(),
        vec![
            "https://backtestingmarket.com/login",
            "https://backtestingmarket.com/backtestingIdea",
        ]
    );
}

#[tokio::test]
async fn test_discovery_skips_placeholders() {
    let page = site();
    let config = fast_config();
    let source = BrowserSource::new(&page, &config);

    let risks = source.discover_risks().await.unwrap();
    let slots = source.discover_slots().await.unwrap();

    let risks: Vec<&str> = risks.iter().map(|r| r.as_str()).collect();
    let slots: Vec<&str> = slots.iter().map(|s| s.as_str()).collect();
    assert_eq!(risks, vec!["conservador", "agresivo"]);
    assert_eq!(slots, vec!["0940", "1000"]);
}

#[tokio::test]
async fn test_full_browser_harvest() {
    let dir = tempfile::tempdir().unwrap();
    let page = site();
    let config = fast_config();
    let mut harvester = Harvester::new(BrowserSource::new(&page, &config), plan(dir.path()));

    let report = harvester.run(&credentials()).await.unwrap();

    assert_eq!(report.manifest.len(), 4);
    assert_eq!(report.summary.ok, 4);
    for record in report.manifest.records() {
        assert_eq!(record.rows, Some(2));
        assert_eq!(std::fs::read_to_string(&record.file).unwrap(), TABLE);
    }
    let first = &report.manifest.records()[0].file;
    assert_eq!(
        *first,
        dir.path()
            .join("SPX/Vertical/conservador")
            .join("table_SPX_Vertical_conservador_0940.csv")
    );
    // The last pair leaves both dropdowns on their final values.
    assert_eq!(page.selected("#risk").as_deref(), Some("Agresivo"));
    assert_eq!(page.selected("#timeHour").as_deref(), Some("10:00"));
    assert!(report.manifest_path.exists());
}

#[tokio::test]
async fn test_unresolvable_slot_is_recorded_and_run_continues() {
    let dir = tempfile::tempdir().unwrap();
    let page = site();
    let config = fast_config();
    let mut plan = plan(dir.path());
    plan.hours = ListSpec::parse("09:40,11:00");
    let mut harvester = Harvester::new(BrowserSource::new(&page, &config), plan);

    let report = harvester.run(&credentials()).await.unwrap();

    let statuses: Vec<&ManifestStatus> =
        report.manifest.records().iter().map(|r| &r.status).collect();
    assert_eq!(statuses[0], &ManifestStatus::Ok);
    assert!(statuses[1].is_error());
    assert_eq!(statuses[2], &ManifestStatus::Ok);
    assert!(statuses[3].is_error());
    assert!(statuses[1].to_string().contains("could not set time to '11:00'"));
    assert!(!report.manifest.records()[1].file.exists());
    assert_eq!(report.summary.errors, 2);
}

#[tokio::test]
async fn test_capture_failure_is_an_error_record() {
    let dir = tempfile::tempdir().unwrap();
    let page = FakePage::new()
        .with_field("input[name='email']")
        .with_field("input[name='password']")
        .with_button("button[type='submit']")
        .with_select("#risk", &[("Conservador", "conservador")])
        .with_select("#timeHour", &[("09:40", "09:40")]);
    let config = fast_config();
    let mut harvester = Harvester::new(BrowserSource::new(&page, &config), plan(dir.path()));

    let report = harvester.run(&credentials()).await.unwrap();

    let record = &report.manifest.records()[0];
    assert!(record.status.to_string().starts_with("error:download failed"));
    assert!(!record.file.exists());
}

#[tokio::test]
async fn test_rejected_landing_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let page = site().with_status(403);
    let config = fast_config();
    let mut harvester = Harvester::new(BrowserSource::new(&page, &config), plan(dir.path()));

    let err = harvester.run(&credentials()).await.unwrap_err();

    assert!(matches!(
        err,
        HarvestError::Session(SessionError::NotConfirmed(_))
    ));
    assert!(!dir.path().join("SPX").exists());
}

#[tokio::test]
async fn test_missing_login_field_is_fatal() {
    let page = FakePage::new().with_field("input[name='email']");
    let config = fast_config();
    let source = BrowserSource::new(&page, &config);

    let err = source.login(&credentials()).await.unwrap_err();

    assert!(matches!(err, SessionError::Interaction(ref e) if e.operation.contains("password")));
}

fn single_pair_site(download: &[u8]) -> FakePage {
    FakePage::new()
        .with_field("input[name='email']")
        .with_field("input[name='password']")
        .with_button("button[type='submit']")
        .with_select("#risk", &[("Conservador", "conservador")])
        .with_select("#timeHour", &[("09:40", "09:40")])
        .with_download_bytes("#downloadCsv", download)
}

#[tokio::test]
async fn test_unreadable_download_is_removed_and_retried_next_run() {
    let dir = tempfile::tempdir().unwrap();
    let config = fast_config();

    let page = single_pair_site(b"Date,Credit\n2024-01-02,\xFF\n");
    let mut harvester = Harvester::new(BrowserSource::new(&page, &config), plan(dir.path()));
    let report = harvester.run(&credentials()).await.unwrap();

    let record = &report.manifest.records()[0];
    assert!(record.status.is_error());
    assert_eq!(record.rows, None);
    assert!(!record.file.exists());

    let page = single_pair_site(TABLE.as_bytes());
    let mut harvester = Harvester::new(BrowserSource::new(&page, &config), plan(dir.path()));
    let report = harvester.run(&credentials()).await.unwrap();

    let record = &report.manifest.records()[0];
    assert_eq!(record.status, ManifestStatus::Ok);
    assert_eq!(record.rows, Some(2));
}

#[tokio::test]
async fn test_header_only_download_leaves_no_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = fast_config();

    for _ in 0..2 {
        let page = single_pair_site(b"Date,Credit\n");
        let mut harvester = Harvester::new(BrowserSource::new(&page, &config), plan(dir.path()));
        let report = harvester.run(&credentials()).await.unwrap();

        let record = &report.manifest.records()[0];
        assert_eq!(record.status, ManifestStatus::Empty);
        assert_eq!(record.rows, Some(0));
        assert!(!record.file.exists());
    }
}

#[tokio::test]
async fn test_header_only_download_kept_with_write_empty() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = fast_config();
    config.output.write_empty = true;
    let page = single_pair_site(b"Date,Credit\n");
    let mut harvester = Harvester::new(BrowserSource::new(&page, &config), plan(dir.path()));

    let report = harvester.run(&credentials()).await.unwrap();

    let record = &report.manifest.records()[0];
    assert_eq!(record.status, ManifestStatus::Empty);
    assert_eq!(std::fs::read_to_string(&record.file).unwrap(), "Date,Credit\n");
}

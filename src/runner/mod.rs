pub mod events;
pub mod hooks;
pub mod scenario;
pub mod scope;
pub mod session;
pub mod state;

use anyhow::Result;
use colored::Colorize;
use std::sync::Arc;
use tokio::sync::watch;

pub use events::*;
pub use scenario::{Fixture, Scenario};
pub use session::Session;
pub use state::*;

use crate::db::SqlxConnector;
use crate::driver::web::PlaywrightLauncher;
use crate::report::types::TestResults;
use crate::report::{AllureSink, ReportSink};
use crate::utils::config::RunConfiguration;
use crate::utils::logger::init_logging;

/// Scenarios whose name contains any of `filters`; all of them when empty.
pub fn select_scenarios<'s>(
    scenarios: &'s [Box<dyn Scenario>],
    filters: &[String],
) -> Vec<&'s dyn Scenario> {
    scenarios
        .iter()
        .map(|s| s.as_ref())
        .filter(|s| filters.is_empty() || filters.iter().any(|f| s.name().contains(f.as_str())))
        .collect()
}

/// Run scenarios against real browser and database, write the run reports
/// and return the summary.
pub async fn run_scenarios(
    scenarios: Vec<Box<dyn Scenario>>,
    filters: &[String],
) -> Result<TestSummary> {
    let config = RunConfiguration::load()?;
    let log = init_logging(&config)?;
    let paths = config.paths();

    let selected = select_scenarios(&scenarios, filters);
    if selected.is_empty() {
        println!("{} No scenarios match the given filters.", "ℹ".blue());
        return Ok(TestSummary::default());
    }

    println!(
        "{} Running {} scenario(s) against {}",
        "▶".green().bold(),
        selected.len(),
        config.base_url.cyan()
    );

    let sink = AllureSink::probe(&paths.allure_results, &config)
        .map(|sink| Arc::new(sink) as Arc<dyn ReportSink>);

    let (emitter, receiver) = EventEmitter::new();
    let listener = tokio::spawn(ConsoleEventListener::listen(receiver));

    let (interrupt_tx, interrupt_rx) = watch::channel(false);
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = interrupt_tx.send(true);
    }) {
        log::warn!("Could not install Ctrl-C handler: {}", e);
    }

    let session = Session::new(
        config.clone(),
        Arc::new(PlaywrightLauncher::new()),
        Arc::new(SqlxConnector),
    )
    .with_sink(sink)
    .with_emitter(emitter)
    .with_log(log);

    let results = run_session(session, &selected, interrupt_rx).await;
    let _ = listener.await;

    crate::report::write_results(&results, &config.report_path)?;
    Ok(results.summary)
}

/// Drive `scenarios` through `session` one at a time until done or
/// interrupted, then close the session.
///
/// An interrupt drops the running test, whose context lease closes the
/// context; the session still closes the browser and connection.
pub async fn run_session(
    mut session: Session,
    scenarios: &[&dyn Scenario],
    mut interrupted: watch::Receiver<bool>,
) -> TestResults {
    session.start();

    for scenario in scenarios {
        if *interrupted.borrow() {
            break;
        }
        tokio::select! {
            _ = session.run_test(*scenario) => {}
            Ok(()) = interrupted.changed() => {
                log::warn!("Run interrupted during {}", scenario.name());
                session.emitter().emit(TestEvent::Interrupted);
                break;
            }
        }
    }

    session.finish().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_config, FakeConnector, FakeLauncher, Probe, ScriptedScenario, Step};

    fn scenarios() -> Vec<Box<dyn Scenario>> {
        vec![
            Box::new(ScriptedScenario::new("home_page_loads", vec![Fixture::Page], Step::Visit)),
            Box::new(ScriptedScenario::new("login_valid", vec![Fixture::Page], Step::Pass)),
            Box::new(ScriptedScenario::new("login_invalid", vec![Fixture::Page], Step::Fail("bad"))),
        ]
    }

    #[test]
    fn test_select_scenarios() {
        let all = scenarios();
        assert_eq!(select_scenarios(&all, &[]).len(), 3);

        let login = select_scenarios(&all, &["login".to_string()]);
        assert_eq!(
            login.iter().map(|s| s.name()).collect::<Vec<_>>(),
            vec!["login_valid", "login_invalid"]
        );
    }

    #[tokio::test]
    async fn test_run_session_runs_all_and_closes_browser() {
        let dir = tempfile::tempdir().unwrap();
        let probe = Probe::default();
        let session = Session::new(
            test_config(dir.path()),
            Arc::new(FakeLauncher::new(probe.clone())),
            Arc::new(FakeConnector::new(probe.clone())),
        );
        let all = scenarios();
        let (_tx, rx) = watch::channel(false);

        let results = run_session(session, &select_scenarios(&all, &[]), rx).await;

        assert_eq!(results.summary.total, 3);
        assert_eq!(results.summary.failed, 1);
        assert!(!results.summary.is_success());
        assert_eq!(probe.count("context.close"), 3);
        assert_eq!(probe.count("browser.close"), 1);

        crate::report::write_results(&results, dir.path()).unwrap();
        assert!(dir.path().join("test-results.json").exists());
        assert!(dir.path().join("junit.xml").exists());
    }

    #[tokio::test]
    async fn test_interrupted_run_still_closes_browser() {
        let dir = tempfile::tempdir().unwrap();
        let probe = Probe::default();
        let session = Session::new(
            test_config(dir.path()),
            Arc::new(FakeLauncher::new(probe.clone())),
            Arc::new(FakeConnector::new(probe.clone())),
        );
        let all = scenarios();
        let (tx, rx) = watch::channel(false);

        let selected = select_scenarios(&all, &[]);
        let first = &selected[..1];
        let results = run_session(session, first, rx.clone()).await;
        assert_eq!(results.summary.total, 1);

        tx.send(true).unwrap();
        let session = Session::new(
            test_config(dir.path()),
            Arc::new(FakeLauncher::new(probe.clone())),
            Arc::new(FakeConnector::new(probe.clone())),
        );
        let results = run_session(session, &selected, rx).await;
        assert_eq!(results.summary.total, 0);
        assert_eq!(probe.count("launcher.launch"), 1);
        assert_eq!(probe.count("browser.close"), 1);
    }

    #[tokio::test]
    async fn test_interrupt_during_test_releases_context_and_browser() {
        let dir = tempfile::tempdir().unwrap();
        let probe = Probe::default();
        let session = Session::new(
            test_config(dir.path()),
            Arc::new(FakeLauncher::new(probe.clone())),
            Arc::new(FakeConnector::new(probe.clone())),
        );
        let stuck = ScriptedScenario::new("stuck_on_page", vec![Fixture::Page], Step::Hang)
            .observed(probe.clone());
        let never_reached = ScriptedScenario::new("never_reached", vec![Fixture::Page], Step::Pass);
        let selected: Vec<&dyn Scenario> = vec![&stuck, &never_reached];
        let (tx, rx) = watch::channel(false);

        let interrupt = async {
            while probe.count("scenario.body") == 0 {
                tokio::task::yield_now().await;
            }
            tx.send(true).unwrap();
        };
        let (results, ()) = tokio::join!(run_session(session, &selected, rx), interrupt);

        for _ in 0..50 {
            if probe.count("context.close") > 0 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        assert_eq!(results.summary.total, 0);
        assert_eq!(probe.count("scenario.body"), 1);
        assert_eq!(probe.count("browser.new_context"), 1);
        assert_eq!(probe.count("context.close"), 1);
        assert_eq!(probe.count("browser.close"), 1);
    }

    #[tokio::test]
    async fn test_run_session_emits_every_event_kind() {
        let dir = tempfile::tempdir().unwrap();
        let probe = Probe::default();
        let (emitter, mut events) = EventEmitter::new();
        let session = Session::new(
            test_config(dir.path()),
            Arc::new(FakeLauncher::new(probe.clone())),
            Arc::new(FakeConnector::new(probe.clone())),
        )
        .with_emitter(emitter);
        let quick = ScriptedScenario::new("quick", vec![Fixture::Page], Step::Pass);
        let stuck = ScriptedScenario::new("stuck", vec![Fixture::Page], Step::Hang)
            .observed(probe.clone());
        let selected: Vec<&dyn Scenario> = vec![&quick, &stuck];
        let (tx, rx) = watch::channel(false);

        let interrupt = async {
            while probe.count("scenario.body") == 0 {
                tokio::task::yield_now().await;
            }
            tx.send(true).unwrap();
        };
        tokio::join!(run_session(session, &selected, rx), interrupt);

        let mut kinds = Vec::new();
        while let Ok(event) = events.try_recv() {
            kinds.push(match event {
                TestEvent::SessionStarted { .. } => "session_started",
                TestEvent::TestStarted { .. } => "test_started",
                TestEvent::TestFinished { .. } => "test_finished",
                TestEvent::Interrupted => "interrupted",
                TestEvent::SessionFinished { .. } => "session_finished",
            });
        }
        assert_eq!(
            kinds,
            vec![
                "session_started",
                "test_started",
                "test_finished",
                "test_started",
                "interrupted",
                "session_finished",
            ]
        );
    }
}

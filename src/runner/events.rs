use super::state::{TestOutcome, TestSummary};
use tokio::sync::broadcast;

/// Test execution events for real-time updates
#[derive(Debug, Clone, PartialEq)]
pub enum TestEvent {
    // Session events
    SessionStarted {
        session_id: String,
        env: String,
    },
    SessionFinished {
        summary: TestSummary,
    },

    // Test events
    TestStarted {
        name: String,
    },
    TestFinished {
        name: String,
        outcome: TestOutcome,
        duration_ms: Option<u64>,
    },

    /// Run was interrupted; remaining tests will not start
    Interrupted,
}

/// Event emitter for broadcasting test events
#[derive(Clone)]
pub struct EventEmitter {
    sender: broadcast::Sender<TestEvent>,
}

impl EventEmitter {
    pub fn new() -> (Self, broadcast::Receiver<TestEvent>) {
        let (sender, receiver) = broadcast::channel(100);
        (Self { sender }, receiver)
    }

    pub fn emit(&self, event: TestEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TestEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(100);
        Self { sender }
    }
}

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration as StdDuration;

/// Console event listener for printing real-time updates
pub struct ConsoleEventListener;

impl ConsoleEventListener {
    pub async fn listen(mut receiver: broadcast::Receiver<TestEvent>) {
        use colored::Colorize;
        use indicatif::ProgressDrawTarget;
        use std::io::IsTerminal;

        // Hidden target when piped, to keep escape codes out of CI logs
        let multi = if std::io::stdout().is_terminal() {
            MultiProgress::new()
        } else {
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
        };

        let mut spinner: Option<ProgressBar> = None;

        loop {
            let event = match receiver.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            };

            match event {
                TestEvent::SessionStarted { session_id, env } => {
                    multi
                        .println(format!(
                            "\n{} Test session started: {} ({})",
                            "▶".green().bold(),
                            session_id.cyan(),
                            env.yellow()
                        ))
                        .ok();
                }

                TestEvent::SessionFinished { summary } => {
                    if let Some(pb) = spinner.take() {
                        pb.finish_and_clear();
                    }

                    println!("\n{} Test session finished", "■".blue().bold());
                    for line in summary_lines(&summary) {
                        println!("{}", line);
                    }
                    break;
                }

                TestEvent::TestStarted { name } => {
                    let pb = multi.add(ProgressBar::new_spinner());
                    if let Ok(style) = ProgressStyle::default_spinner()
                        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
                        .template("  {spinner} {msg}")
                    {
                        pb.set_style(style);
                    }
                    pb.set_message(format!("{}... ", name.dimmed()));
                    pb.enable_steady_tick(StdDuration::from_millis(100));
                    spinner = Some(pb);
                }

                TestEvent::TestFinished {
                    name,
                    outcome,
                    duration_ms,
                } => {
                    if let Some(pb) = spinner.take() {
                        pb.finish_and_clear();
                    }
                    let duration = duration_ms.unwrap_or(0);
                    let line = match &outcome {
                        TestOutcome::Passed => {
                            format!("  {} {} ({}ms)", "✓".green(), name, duration)
                        }
                        TestOutcome::Failed { message } => format!(
                            "  {} {} ({}ms)\n      {}",
                            "✗".red(),
                            name,
                            duration,
                            message.red()
                        ),
                        TestOutcome::Errored { message } => format!(
                            "  {} {} ({}ms)\n      {}",
                            "!".red().bold(),
                            name,
                            duration,
                            message.red()
                        ),
                        TestOutcome::Skipped { reason } => {
                            format!("  {} {} ({})", "○".yellow(), name, reason.dimmed())
                        }
                    };
                    println!("{}", line);
                }

                TestEvent::Interrupted => {
                    if let Some(pb) = spinner.take() {
                        pb.finish_and_clear();
                    }
                    println!("{} Run interrupted", "⚠".yellow().bold());
                }
            }
        }
    }
}

/// The end-of-run summary block, the only place run totals are printed.
pub fn summary_lines(summary: &TestSummary) -> Vec<String> {
    use colored::Colorize;

    let mut lines = vec![
        format!("  Total tests: {}", summary.total),
        format!(
            "  {} passed, {} failed, {} errors, {} skipped",
            summary.passed.to_string().green(),
            summary.failed.to_string().red(),
            summary.errored.to_string().red(),
            summary.skipped.to_string().yellow()
        ),
    ];
    if let Some(duration) = summary.total_duration_ms {
        lines.push(format!("  Duration: {}ms", duration));
    }
    lines
}

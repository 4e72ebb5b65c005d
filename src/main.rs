use clap::{Parser, Subcommand};

use lumi_harness::driver::BrowserType;
use lumi_harness::{runner, scenarios, utils};

#[derive(Parser)]
#[command(name = "lumi-harness")]
#[command(author = "NL Team")]
#[command(version = "0.1.0")]
#[command(about = "Browser and database test harness", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the built-in scenarios
    Run {
        /// Only run scenarios whose name contains this text. Can be specified multiple times.
        #[arg(short, long)]
        filter: Vec<String>,

        /// List matching scenarios without running them
        #[arg(long, default_value = "false")]
        list: bool,
    },

    /// Print the resolved configuration with secrets masked
    Config,

    /// Manage system components
    System {
        #[command(subcommand)]
        command: SystemCommands,
    },
}

#[derive(Subcommand)]
enum SystemCommands {
    /// Install browser binaries
    Install {
        /// Browser to install (chromium, firefox, webkit)
        #[arg(short, long)]
        browser: Option<BrowserType>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { filter, list } => {
            let all = scenarios::builtin();

            if list {
                for scenario in runner::select_scenarios(&all, &filter) {
                    println!("  {}", scenario.name());
                }
                return Ok(());
            }

            let summary = runner::run_scenarios(all, &filter).await?;

            if !summary.is_success() {
                std::process::exit(1);
            }
        }

        Commands::Config => {
            let config = utils::config::RunConfiguration::load()?;
            for line in config.summary() {
                println!("{}", line);
            }
        }

        Commands::System { command } => match command {
            SystemCommands::Install { browser } => {
                utils::system::handle_system_command(utils::system::SystemCommand::Install {
                    browser,
                })
                .await?;
            }
        },
    }

    Ok(())
}

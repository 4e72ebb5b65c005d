use anyhow::Result;
use colored::Colorize;

use crate::driver::traits::{BrowserLauncher, BrowserType};
use crate::driver::web::PlaywrightLauncher;

pub enum SystemCommand {
    Install { browser: Option<BrowserType> },
}

pub async fn handle_system_command(command: SystemCommand) -> Result<()> {
    match command {
        SystemCommand::Install { browser } => {
            let launcher = PlaywrightLauncher::new();
            let browsers = match browser {
                Some(b) => vec![b],
                None => vec![BrowserType::Chromium],
            };
            install_browsers(&launcher, &browsers).await
        }
    }
}

/// Install browser binaries through the launcher, stopping at the first failure.
pub async fn install_browsers(launcher: &dyn BrowserLauncher, browsers: &[BrowserType]) -> Result<()> {
    println!("{}", "Checking browser components...".blue().bold());

    for browser in browsers {
        println!("{} Installing Playwright {}...", "⬇".yellow(), browser);
        launcher.install(*browser).await?;
        println!("{} Playwright {} installed.", "✓".green(), browser);
    }

    println!("\n{}", "All browser components are ready!".green().bold());
    Ok(())
}

use clap::{Parser, Subcommand};

use groundloop::agent_engine::state::StepOutcome;
use groundloop::config;

#[derive(Parser)]
#[command(name = "groundloop", version, about = "Vision-grounded GUI automation loop")]
struct Args {
    /// config.toml to use instead of the default lookup
    #[arg(long, global = true)]
    config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    mode: Option<Mode>,
}

#[derive(Subcommand)]
enum Mode {
    /// Run the configured task steps (default)
    Run,
    /// Re-execute saved step scripts in order
    Replay {
        /// Skip the screenshot after each snippet
        #[arg(long)]
        no_screenshots: bool,
    },
    /// Merge saved step scripts into one script
    Integrate,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    groundloop::init_tracing();

    // Load .env file if present (ignore error if not found)
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    if let Some(path) = &args.config {
        std::env::set_var("GROUNDLOOP_CONFIG", path);
    }
    let cfg = config::load_config()?;

    match args.mode.unwrap_or(Mode::Run) {
        Mode::Run => {
            let report = groundloop::run_task(&cfg).await?;
            for step in &report.steps {
                let verified = match step.verified() {
                    Some(true) => "verified",
                    Some(false) => "NOT verified",
                    None => "unchecked",
                };
                println!(
                    "step {}: {} after {} iteration(s), {} attempt(s), {}",
                    step.report.step,
                    step.report.outcome.label(),
                    step.report.iterations,
                    step.attempts,
                    verified
                );
                if let StepOutcome::Error { message } = &step.report.outcome {
                    println!("  error: {message}");
                }
            }
        }
        Mode::Replay { no_screenshots } => {
            let reports = groundloop::replay(&cfg, !no_screenshots).await?;
            for r in &reports {
                println!("{}: {:?}", r.path.display(), r.status);
            }
        }
        Mode::Integrate => match groundloop::integrate(&cfg).await? {
            Some((script, path)) => {
                if let Some(path) = path {
                    eprintln!("integrated script written to {}", path.display());
                }
                println!("{script}");
            }
            None => eprintln!("no saved step scripts to integrate"),
        },
    }
    Ok(())
}

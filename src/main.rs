//! sql-runner - runs SQL playbooks against warehouse targets.

use sql_runner::cli::Cli;
use sql_runner::config::Playbook;
use sql_runner::db;
use sql_runner::error::Result;
use sql_runner::logging;
use sql_runner::orchestrator::{self, EXIT_FATAL};
use sql_runner::query::resolve_steps;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    logging::init_stderr_logging();

    let code = match run(Cli::parse_args()).await {
        Ok(code) => code,
        Err(e) => {
            error!("{}: {}", e.category(), e);
            EXIT_FATAL
        }
    };

    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<i32> {
    info!("Loading playbook from: {}", cli.playbook.display());
    let mut playbook = Playbook::load_from_file(&cli.playbook)?;
    playbook.retain_targets(&cli.targets)?;
    for target in &mut playbook.targets {
        target.apply_env_defaults();
    }
    playbook.validate()?;

    let steps = resolve_steps(&playbook.steps, &cli.sql_root(), cli.from_step.as_deref()).await?;
    if cli.dry_run {
        info!("Dry run: nothing will be sent to the targets");
    }

    let runners = db::connect_all(&playbook.targets, cli.dry_run).await?;
    let report = orchestrator::run(&runners, &steps, cli.dry_run).await;
    db::close_all(&runners).await;

    info!(
        "Ran {} queries, {} failed",
        report.query_count(),
        report.failure_count()
    );
    Ok(report.exit_code())
}

use anyhow::{bail, Context, Result};
use timesheet_agent::{
    Agent, AgentConfig, ChromiumSession, ClickSettings, Config, OpenAiPlanner, Registry,
    RunStatus, TimesheetTask,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = Config::from_env().context("loading configuration")?;
    let start_url = cfg.start_url().context("building start URL")?;
    let task = TimesheetTask::for_today(start_url.as_str(), cfg.location.as_str());

    let registry = Registry::with_defaults(ClickSettings { settle_delay: cfg.settle_delay });
    let planner = OpenAiPlanner::new(cfg.planner(), registry.describe())?;
    let agent = Agent::new(
        planner,
        registry,
        AgentConfig {
            max_steps: cfg.max_steps,
            max_failures: cfg.max_failures,
            use_vision: cfg.use_vision,
        },
    );

    let session = ChromiumSession::launch(cfg.browser())
        .await
        .context("launching browser")?;
    let outcome = agent
        .run(&task.render(), Some(start_url.as_str()), &session)
        .await;
    if let Err(e) = session.close().await {
        warn!("browser did not close cleanly: {e:#}");
    }

    let report = outcome?;
    info!(run_id = %report.run_id, status = ?report.status, steps = report.steps.len(), "timesheet run complete");
    println!("{}", serde_json::to_string_pretty(&report)?);
    if report.status != RunStatus::Success {
        bail!(
            "timesheet run did not finish: {}",
            report.message.unwrap_or_else(|| format!("{:?}", report.status))
        );
    }
    Ok(())
}

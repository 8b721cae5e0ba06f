use std::sync::Arc;

use anyhow::{bail, Context, Result};
use carport_uploader::{Config, HttpStore, Pipeline, Reporter, Scheduler};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::args::Args;
use crate::spinner;

pub struct Cli {
    args: Args,
}

impl Cli {
    pub fn new(args: Args) -> Self {
        Self { args }
    }

    pub async fn exec(self) -> Result<()> {
        let config = self.load_config()?;
        info!("Using endpoint {}", config.endpoint);

        let store = HttpStore::new(
            config.endpoint.clone(),
            self.args.token.clone(),
            config.request_timeout,
        )
        .context("Failed to build the HTTP client")?;

        let (tx, rx) = mpsc::unbounded_channel();
        let ui = tokio::spawn(spinner::render(rx));

        let pipeline = Pipeline::from_config(&config, Arc::new(store), Reporter::new(tx));
        let scheduler = Scheduler::new(pipeline, config.concurrency);
        let result = scheduler.run_all(&self.args.directory).await;
        // Closes the event channel so the spinner can finish.
        drop(scheduler);
        join_spinner(ui).await;

        let report = result?;
        if report.dead_lettered > 0 {
            info!(
                "{} files never reconciled, see {:?}",
                report.dead_lettered, config.dead_letter
            );
        }
        if !report.failed.is_empty() {
            bail!(
                "{} of {} files failed to upload",
                report.failed.len(),
                report.total()
            );
        }
        Ok(())
    }

    fn load_config(&self) -> Result<Config> {
        let mut config = match &self.args.config {
            Some(path) => Config::load(path)
                .with_context(|| format!("Failed to load config from {path:?}"))?,
            None => Config::default(),
        };
        if let Some(endpoint) = &self.args.endpoint {
            config.endpoint = endpoint.clone();
        }
        config.validate()?;
        Ok(config)
    }

    pub fn setup(&self) {
        // Build the filter from cli args, or environment variable
        let env_filter = EnvFilter::builder()
            .with_default_directive(
                match self.args.verbose {
                    0 => LevelFilter::INFO,
                    1 => LevelFilter::DEBUG,
                    _2_or_more => LevelFilter::TRACE,
                }
                .into(),
            )
            .from_env_lossy();

        // Initialize the registry for logging events
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_file(self.args.with_log_locations)
                    .with_line_number(self.args.with_log_locations),
            )
            .with(env_filter)
            .init();
    }
}

/// Waits for the spinner task. Returns `false` if it panicked or was cancelled.
async fn join_spinner(ui: JoinHandle<()>) -> bool {
    match ui.await {
        Ok(()) => true,
        Err(e) => {
            warn!("spinner task failed: {e}");
            false
        },
    }
}

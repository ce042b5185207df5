//! CLI runner - executes commands

use crate::cli::commands::{Cli, Commands, OutputFormat};
use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::pipeline::{Pipeline, PipelineReport, StageReport};
use crate::types::Stage;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{error, info};

/// CLI runner
pub struct Runner {
    cli: Cli,
}

impl Runner {
    /// Create a new runner
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Run the CLI command
    pub async fn run(&self) -> Result<()> {
        let config = self.load_config()?;

        match &self.cli.command {
            Commands::Validate => self.validate(&config),
            Commands::Run { every: None } => {
                let pipeline = Pipeline::from_config(config)?;
                self.run_once(&pipeline).await.map(|_| ())
            }
            Commands::Run { every: Some(secs) } => {
                if *secs == 0 {
                    return Err(Error::invalid_value("--every", "must be at least 1 second"));
                }
                let pipeline = Pipeline::from_config(config)?;
                self.run_every(&pipeline, Duration::from_secs(*secs)).await
            }
            Commands::Ingest => self.stage(config, Stage::Ingest).await,
            Commands::Promote => self.stage(config, Stage::Promote).await,
            Commands::Check => self.stage(config, Stage::Check).await,
            Commands::Publish => self.stage(config, Stage::Publish).await,
        }
    }

    fn load_config(&self) -> Result<PipelineConfig> {
        match &self.cli.config {
            Some(path) => PipelineConfig::load(path),
            None => {
                info!("No --config given, using built-in defaults");
                PipelineConfig::from_yaml_str("")
            }
        }
    }

    /// Print the effective configuration
    fn validate(&self, config: &PipelineConfig) -> Result<()> {
        // Only the variable name is printed, never the token itself
        let api_key_present = config.ingest.api_key().is_ok();
        self.output_message(&json!({
            "type": "CONFIG",
            "valid": true,
            "api_key_present": api_key_present,
            "config": serde_json::to_value(config)?,
        }));
        Ok(())
    }

    async fn stage(&self, config: PipelineConfig, stage: Stage) -> Result<()> {
        let pipeline = Pipeline::from_config(config)?;
        let report = pipeline.run_stage(stage).await?;
        self.output_message(&stage_message(&report));
        Ok(())
    }

    async fn run_once(&self, pipeline: &Pipeline) -> Result<PipelineReport> {
        let report = pipeline
            .run_with(|stage| self.output_message(&stage_message(stage)))
            .await?;
        self.output_message(&report_message(&report));
        Ok(report)
    }

    /// Repeat full runs on a fixed interval until interrupted
    ///
    /// A failed run is reported and the next one still happens.
    async fn run_every(&self, pipeline: &Pipeline, interval: Duration) -> Result<()> {
        loop {
            if let Err(e) = self.run_once(pipeline).await {
                error!("Pipeline run failed: {}", e);
                self.output_message(&json!({
                    "type": "LOG",
                    "level": "ERROR",
                    "message": e.to_string(),
                }));
            }

            info!("Next run in {}s", interval.as_secs());
            tokio::select! {
                () = tokio::time::sleep(interval) => {}
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted, stopping");
                    return Ok(());
                }
            }
        }
    }

    /// Output a JSON message
    fn output_message(&self, msg: &Value) {
        match self.cli.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string(msg).unwrap_or_default());
            }
            OutputFormat::Pretty => {
                println!("{}", serde_json::to_string_pretty(msg).unwrap_or_default());
            }
        }
    }
}

fn stage_message(report: &StageReport) -> Value {
    json!({
        "type": "STAGE",
        "stage": report.stage,
        "duration_ms": report.duration_ms,
        "detail": report.detail,
    })
}

fn report_message(report: &PipelineReport) -> Value {
    json!({
        "type": "REPORT",
        "status": "SUCCEEDED",
        "started_at": report.started_at.to_rfc3339(),
        "duration_ms": report.duration_ms,
        "stages": report.stages.iter().map(|s| s.stage).collect::<Vec<_>>(),
    })
}

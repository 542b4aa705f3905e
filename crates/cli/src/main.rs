mod cli;
mod codeql;
mod github;
mod init;
mod tracing;

use miette::IntoDiagnostic;

use crate::init::InitSummary;
use crate::tracing::{LogLevel, TracingConfig, TracingFormat};

#[tokio::main]
async fn main() -> miette::Result<()> {
    let cli = cli::parse();

    let tracing_config = TracingConfig {
        format: if cli.json {
            TracingFormat::Json
        } else {
            cli.log_format.unwrap_or(TracingFormat::Compact)
        },
        level: cli.level.into(),
        enable_file_location: matches!(cli.level, LogLevel::Trace),
        ..Default::default()
    };
    crate::tracing::init_tracing(tracing_config)?;

    let summary = init::run(&cli).await?;
    print_summary(&summary)
}

#[allow(clippy::print_stdout)]
fn print_summary(summary: &InitSummary) -> miette::Result<()> {
    println!("{}", serde_json::to_string_pretty(summary).into_diagnostic()?);
    Ok(())
}

use anyhow::{Context, Result};
use chrono::Local;
use clap::{CommandFactory, Parser, error::ErrorKind};
use cli::{Cli, Mode};
use output::OutputDir;
use researcher_common::model::ResearchQuery;
use researcher_common::observability::{LogConfig, init_logging};
use researcher_config::ResearcherConfigLoader;
use researcher_pipeline::ResearchContext;

mod cli;
mod output;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let query = cli.research_query().map(str::to_owned);
    if cli.mode == Mode::Research && query.is_none() {
        Cli::command()
            .error(
                ErrorKind::MissingRequiredArgument,
                "research mode needs a query (--query)",
            )
            .exit();
    }

    // File, then RESEARCHER__* env, then flags.
    let mut config = ResearcherConfigLoader::new()
        .with_optional_file(&cli.config)
        .load()
        .with_context(|| format!("failed to load config from {}", cli.config.display()))?;
    cli.apply(&mut config);
    config.validate().context("invalid configuration")?;

    let log_path = init_logging(LogConfig::for_cli(config.output.debug))?;
    tracing::info!(log = %log_path.display(), mode = ?cli.mode, "deep-researcher starting");

    let output = OutputDir::create(&config.output.dir)?;
    let ctx = ResearchContext::acquire(&config)
        .await
        .context("failed to start research session")?;

    match (cli.mode, query) {
        (Mode::Research, Some(text)) => {
            let query = ResearchQuery::research(text, config.research.article_limit);
            let run = match ctx.research(&query).await {
                Ok(run) => run,
                Err(failure) => {
                    if let Some(dir) = output.write_failed_research(&query.text, &failure)? {
                        eprintln!("Run failed; diagnostics written to {}", dir.display());
                    }
                    return Err(failure.into());
                }
            };
            let dir = output.write_research(&run)?;
            println!(
                "Research complete: {} of {} sources summarized ({} skipped). Report: {}",
                run.report.metadata.summarized,
                run.report.metadata.candidates,
                run.report.skipped_count(),
                dir.join("research_report.md").display()
            );
        }
        (Mode::Comedy, _) => {
            let today = Local::now().date_naive();
            let run = match ctx.comedy(today).await {
                Ok(run) => run,
                Err(failure) => {
                    if let Some(dir) = output.write_failed_comedy(today, &failure)? {
                        eprintln!("Run failed; diagnostics written to {}", dir.display());
                    }
                    return Err(failure.into());
                }
            };
            let script = output.write_comedy(&run)?;
            println!("Comedy script: {}", script.display());
        }
        (Mode::Research, None) => ctx.release().await,
    }
    Ok(())
}

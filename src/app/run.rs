use crate::bench;
use crate::cli::app_config::Cli;
use crate::config::BenchConfig;
use crate::response::{render_json, render_text};
use clap::Parser;
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

pub async fn main_with_error() -> Result<(), anyhow::Error> {
    let cli: Cli = Cli::parse();

    do_bench(cli).await
}

fn init_logging(verbosity: u8) -> Result<(), anyhow::Error> {
    let log_level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = EnvFilter::builder()
        .with_default_directive(log_level.into())
        .from_env_lossy()
        .add_directive("hyper_util=off".parse()?);
    let subscriber = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .with_span_events(FmtSpan::NONE)
        .with_env_filter(filter)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
    Ok(())
}

async fn do_bench(cli: Cli) -> Result<(), anyhow::Error> {
    init_logging(cli.verbosity)?;

    let config = BenchConfig::try_from(&cli)?;
    let run = bench::run(&config).await?;
    let report = run.summarize()?;

    if cli.json {
        println!("{}", render_json(&report, &run)?);
    } else {
        print!("{}", render_text(&report, &run));
    }
    Ok(())
}

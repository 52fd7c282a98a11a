// Entry point and high-level CLI flow.
//
// - Loading fetches the primary area and each comparison area from the
//   coronavirus dashboard API (or reads the cached copies with `--cached`).
// - Generating builds the template context from all loaded areas, renders
//   the HTML page and exports the context next to it.
// Any failure aborts the run before the page is written.
mod config;
mod error;
mod extract;
mod loader;
mod output;
mod reports;
mod types;
mod util;

use chrono::Utc;
use clap::Parser;
use config::ReportConfig;
use error::ReportError;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::EnvFilter;
use types::AreaRecords;

/// Build the COVID-19 summary page for a local authority.
#[derive(Parser, Debug)]
#[command(name = "covid-report", version, about, long_about = None)]
struct Cli {
    /// Use the previously cached API responses instead of fetching.
    #[arg(long)]
    cached: bool,

    /// JSON configuration file; missing fields keep their defaults.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory for cached API responses.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Directory the report is written to.
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Handlebars template for the page.
    #[arg(long)]
    template: Option<PathBuf>,

    /// More log output (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<ReportConfig, ReportError> {
    let mut config = ReportConfig::load(cli.config.as_deref())?;
    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(dir) = &cli.output_dir {
        config.output_dir = dir.clone();
    }
    if let Some(template) = &cli.template {
        config.template = template.clone();
    }
    Ok(config)
}

/// Fetch or read every area, printing one line per area.
fn handle_load(config: &ReportConfig, cached: bool) -> Result<Vec<AreaRecords>, ReportError> {
    let (areas, load_reports) = loader::load_all(config, cached)?;
    for report in &load_reports {
        let how = match report.source {
            loader::Source::Fetched => "fetched",
            loader::Source::Cached => "read from cache",
        };
        println!(
            "{}: {} records {} (latest {})",
            report.area,
            util::format_count(report.records),
            how,
            report.latest_date.as_deref().unwrap_or("n/a")
        );
    }
    println!();
    Ok(areas)
}

/// Build the context, write the page and the context exports.
fn handle_generate_report(
    config: &ReportConfig,
    areas: &[AreaRecords],
) -> Result<(), ReportError> {
    let Some((primary, comparisons)) = areas.split_first() else {
        return Err(ReportError::Config("no areas configured".into()));
    };

    println!("Generating report...");
    let ctx = reports::build_context(config, primary, comparisons, Utc::now())?;
    info!(fields = ctx.len(), "context ready");

    let dir = config.report_dir();
    let page = dir.join("index.html");
    output::write_report(&config.template, &page, &ctx)?;
    output::write_json(&dir.join("context.json"), &ctx)?;
    output::write_csv(&dir.join("context.csv"), &ctx.rows())?;

    if let Some(end) = ctx.get("cases_end_date") {
        println!("Latest complete case figures: {}", end);
    }
    println!("Report context ({} fields):\n", ctx.len());
    output::print_context(&ctx);
    println!("(Page written to {})", page.display());
    Ok(())
}

fn run(cli: &Cli) -> Result<(), ReportError> {
    let config = load_config(cli)?;
    let areas = handle_load(&config, cli.cached)?;
    handle_generate_report(&config, &areas)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("Failed to generate report: {}", e);
            ExitCode::FAILURE
        }
    }
}

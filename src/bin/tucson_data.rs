use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use tucson_data::app::{App, ListResult, MaterializeResult, ProgressEvent, ProgressSink};
use tucson_data::config::{ConfigLoader, ResolvedConfig};
use tucson_data::domain::{AssetKey, ServiceFamily};
use tucson_data::error::PipelineError;
use tucson_data::esri::{EsriService, HttpTransport};
use tucson_data::output::{JsonOutput, OutputMode};
use tucson_data::store::Store;

#[derive(Parser)]
#[command(name = "tucson-data")]
#[command(about = "Download Pima County GIS layers and clip them to the City of Tucson")]
#[command(version)]
struct Cli {
    /// Path to a JSON config file (default: ./tucson-data.json if present)
    #[arg(long, global = true)]
    config: Option<Utf8PathBuf>,

    /// Print machine-readable JSON instead of a summary
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Build assets and write their artifacts")]
    Materialize(MaterializeArgs),
    #[command(about = "List assets, their dependencies and artifact paths")]
    List,
}

#[derive(Args)]
struct MaterializeArgs {
    /// Assets to build, in any order; all of them when omitted
    assets: Vec<String>,
}

struct LogSink;

impl ProgressSink for LogSink {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => {
                tracing::info!(elapsed_ms = elapsed.as_millis() as u64, "{}", event.message)
            }
            None => tracing::info!("{}", event.message),
        }
    }
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<PipelineError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &PipelineError) -> u8 {
    match error {
        PipelineError::UnknownAsset(_)
        | PipelineError::ArtifactMissing(_)
        | PipelineError::ConfigRead(_)
        | PipelineError::ConfigParse(_)
        | PipelineError::InvalidConfig(_) => 2,
        PipelineError::Transport(_)
        | PipelineError::TransportStatus { .. }
        | PipelineError::MalformedResponse { .. }
        | PipelineError::PageLimitExceeded { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };

    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    let app = build_app(&config)?;

    match cli.command {
        Commands::Materialize(args) => {
            let assets = args
                .assets
                .iter()
                .map(|name| name.parse::<AssetKey>())
                .collect::<Result<Vec<_>, _>>()?;
            match output_mode {
                OutputMode::Json => {
                    let result = app.materialize(&assets, &JsonOutput)?;
                    JsonOutput::print_materialize(&result).into_diagnostic()?;
                }
                OutputMode::Human => {
                    let result = app.materialize(&assets, &LogSink)?;
                    print_materialize_summary(&result);
                }
            }
        }
        Commands::List => {
            let result = app.list();
            match output_mode {
                OutputMode::Json => JsonOutput::print_list(&result).into_diagnostic()?,
                OutputMode::Human => print_list(&result),
            }
        }
    }
    Ok(())
}

fn build_app(
    config: &ResolvedConfig,
) -> Result<App<EsriService<HttpTransport>, EsriService<HttpTransport>>, PipelineError> {
    let pima_gis = EsriService::http(
        config.base_url(ServiceFamily::PimaGis),
        config.paging,
        config.timeout,
    )?;
    let pag_region = EsriService::http(
        config.base_url(ServiceFamily::PagRegion),
        config.paging,
        config.timeout,
    )?;
    Ok(App::new(
        Store::new(config.data_dir.clone()),
        pima_gis,
        pag_region,
        config.boundary.clone(),
    ))
}

fn print_materialize_summary(result: &MaterializeResult) {
    let green = "\x1b[32m";
    let reset = "\x1b[0m";

    println!("{green}Materialized {} asset(s){reset}", result.items.len());
    for item in &result.items {
        println!(
            "  {:<28} {:>7} records  {:>6} ms  {}",
            item.asset, item.records, item.elapsed_ms, item.path
        );
    }
}

fn print_list(result: &ListResult) {
    for entry in &result.assets {
        let marker = if entry.materialized { "*" } else { " " };
        println!("{marker} {:<28} {}", entry.asset, entry.description);
        if !entry.deps.is_empty() {
            println!("    deps: {}", entry.deps.join(", "));
        }
        println!("    path: {}", entry.path);
    }
}

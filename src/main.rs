//! dms-sync CLI entrypoint.
//!
//! This is the main entrypoint for the dms-sync command-line tool.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use dms_sync::cdf::CdfClient;
use dms_sync::cli::{Cli, Commands, KindArg, OutputFormatter};
use dms_sync::config::{ConfigParser, DeployConfig, SchemaValidator, find_config_file};
use dms_sync::deployer::{DeployOptions, Deployer};
use dms_sync::error::{Result, SyncError};
use dms_sync::loader::SchemaLoaders;
use dms_sync::planner::{ExistingPolicy, MergePolicy};
use dms_sync::schema::{ContainerId, DataModelId, DmsSchema, SpaceId, ViewId};

use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse_args();

    // Initialize logging
    init_logging(cli.verbose, cli.log_json);

    // Every remote call is awaited before the next one starts.
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
fn init_logging(verbose: bool, json: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<ExitCode> {
    let formatter = OutputFormatter::new(cli.output);
    let config_path = cli.config.as_ref();

    match cli.command {
        Commands::Validate { warnings } => cmd_validate(config_path, warnings, &formatter),
        Commands::Plan {
            existing,
            governance,
            detailed,
        } => cmd_plan(config_path, existing, governance, detailed, &formatter).await,
        Commands::Deploy {
            existing,
            governance,
            dry_run,
            restore_on_failure,
            no_cache,
            yes,
        } => {
            let overrides = DeployOverrides {
                existing,
                governance,
                dry_run,
                restore_on_failure,
                no_cache,
            };
            cmd_deploy(config_path, overrides, yes, &formatter).await
        }
        Commands::Retrieve {
            kind,
            ids,
            recursive,
            connected,
        } => cmd_retrieve(config_path, kind, &ids, recursive, connected, &formatter).await,
    }
}

/// Command-line overrides of the configured deployment settings.
#[derive(Debug, Clone, Copy, Default)]
struct DeployOverrides {
    existing: Option<ExistingPolicy>,
    governance: Option<MergePolicy>,
    dry_run: bool,
    restore_on_failure: bool,
    no_cache: bool,
}

impl DeployOverrides {
    fn options(self, config: &DeployConfig) -> DeployOptions {
        DeployOptions {
            existing: self.existing.unwrap_or(config.deploy.existing),
            governance: self.governance.unwrap_or(config.deploy.governance),
            dry_run: self.dry_run || config.deploy.dry_run,
            restore_on_failure: self.restore_on_failure || config.deploy.restore_on_failure,
        }
    }

    const fn cache(self, config: &DeployConfig) -> bool {
        config.deploy.cache && !self.no_cache
    }
}

/// Validate configuration and schema.
fn cmd_validate(
    config_path: Option<&PathBuf>,
    show_warnings: bool,
    formatter: &OutputFormatter,
) -> Result<ExitCode> {
    let config_file = resolve_config_path(config_path)?;
    info!("Validating configuration: {}", config_file.display());

    let parser = parser_for(&config_file);
    parser.load_dotenv()?;
    let config = parser.load_with_env(&config_file)?;
    let schema = parser.load_schema(config.schema_path(config_dir(&config_file)))?;

    let result = SchemaValidator::new().check(&schema);
    emit(&formatter.format_validation(&result, show_warnings));

    if !result.is_valid() {
        return Ok(ExitCode::FAILURE);
    }

    eprintln!("\nConfiguration summary:");
    eprintln!("  Project: {}", config.project.name);
    eprintln!("  CDF project: {} ({})", config.cdf.project, config.cdf.base_url);
    eprintln!("  Spaces: {}", schema.spaces.len());
    eprintln!("  Containers: {}", schema.containers.len());
    eprintln!("  Views: {}", schema.views.len());
    eprintln!("  Data models: {}", schema.data_models.len());

    Ok(ExitCode::SUCCESS)
}

/// Show deployment plan.
async fn cmd_plan(
    config_path: Option<&PathBuf>,
    existing: Option<ExistingPolicy>,
    governance: Option<MergePolicy>,
    detailed: bool,
    formatter: &OutputFormatter,
) -> Result<ExitCode> {
    let (config, schema) = load_config_and_schema(config_path)?;
    let overrides = DeployOverrides {
        existing,
        governance,
        ..DeployOverrides::default()
    };
    let mut deployer = create_deployer(&config, overrides)?;

    let plan = deployer.plan(&schema).await?;
    emit(&formatter.format_plan(&plan, detailed));

    Ok(ExitCode::SUCCESS)
}

/// Deploy the local schema.
async fn cmd_deploy(
    config_path: Option<&PathBuf>,
    overrides: DeployOverrides,
    auto_approve: bool,
    formatter: &OutputFormatter,
) -> Result<ExitCode> {
    let (config, schema) = load_config_and_schema(config_path)?;
    let mut deployer = create_deployer(&config, overrides)?;
    let dry_run = deployer.options().dry_run;

    if !dry_run && !auto_approve {
        let plan = deployer.plan(&schema).await?;
        if plan.is_noop() && plan.summaries().iter().all(|s| s.existing == 0) {
            emit(&formatter.message("No changes to deploy."));
            return Ok(ExitCode::SUCCESS);
        }
        eprintln!("{}", formatter.format_plan(&plan, true));

        if !confirm("Do you want to deploy this plan? [y/N]: ")? {
            eprintln!("Deployment cancelled.");
            return Ok(ExitCode::SUCCESS);
        }
    }

    let result = deployer.deploy(&schema).await?;
    emit(&formatter.format_result(&result));

    if result.status.is_failure() {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

/// Retrieve resources from the project.
async fn cmd_retrieve(
    config_path: Option<&PathBuf>,
    kind: KindArg,
    raw_ids: &[String],
    recursive: bool,
    connected: bool,
    formatter: &OutputFormatter,
) -> Result<ExitCode> {
    let config_file = resolve_config_path(config_path)?;
    let parser = parser_for(&config_file);
    parser.load_dotenv()?;
    let config = parser.load_with_env(&config_file)?;
    let mut loaders = create_loaders(&config, true)?;

    let parts = raw_ids
        .iter()
        .map(|raw| kind.split_identifier(raw))
        .collect::<Result<Vec<_>>>()?;
    debug!("Retrieving {} {kind:?}", parts.len());

    let output = match kind {
        KindArg::Spaces => {
            let ids: Vec<SpaceId> = parts.iter().map(|p| SpaceId::new(&p[0])).collect();
            let items = loaders.spaces.retrieve(&ids).await.map_err(SyncError::from)?;
            formatter.format_resources(&items)
        }
        KindArg::Containers => {
            let ids: Vec<ContainerId> = parts.iter().map(|p| ContainerId::new(&p[0], &p[1])).collect();
            let items = if recursive {
                loaders.containers.retrieve_with_required(&ids).await?.items
            } else {
                loaders.containers.retrieve(&ids).await.map_err(SyncError::from)?
            };
            formatter.format_resources(&items)
        }
        KindArg::Views => {
            let ids: Vec<ViewId> = parts.iter().map(|p| ViewId::new(&p[0], &p[1], &p[2])).collect();
            let items = loaders.views.retrieve_views(&ids, connected, recursive).await?;
            formatter.format_resources(&items)
        }
        KindArg::DataModels => {
            let ids: Vec<DataModelId> = parts
                .iter()
                .map(|p| DataModelId::new(&p[0], &p[1], &p[2]))
                .collect();
            let items = loaders.data_models.retrieve(&ids).await.map_err(SyncError::from)?;
            formatter.format_resources(&items)
        }
    };
    emit(&output);

    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Resolves the configuration file path.
fn resolve_config_path(config_path: Option<&PathBuf>) -> Result<PathBuf> {
    config_path.map_or_else(|| find_config_file("."), |path| Ok(path.clone()))
}

/// Directory containing the configuration file.
fn config_dir(config_file: &Path) -> &Path {
    config_file.parent().unwrap_or_else(|| Path::new("."))
}

fn parser_for(config_file: &Path) -> ConfigParser {
    ConfigParser::new().with_base_path(config_dir(config_file))
}

/// Loads configuration and the validated local schema.
fn load_config_and_schema(config_path: Option<&PathBuf>) -> Result<(DeployConfig, DmsSchema)> {
    let config_file = resolve_config_path(config_path)?;
    debug!("Loading configuration from: {}", config_file.display());

    let parser = parser_for(&config_file);
    parser.load_dotenv()?;
    let config = parser.load_with_env(&config_file)?;

    let schema = parser.load_schema(config.schema_path(config_dir(&config_file)))?;
    let validation = SchemaValidator::new().validate(&schema)?;
    for warning in &validation.warnings {
        debug!("Schema warning: {warning}");
    }

    Ok((config, schema))
}

/// Creates loaders on top of a data modeling API client.
fn create_loaders(config: &DeployConfig, cache: bool) -> Result<SchemaLoaders> {
    let client = CdfClient::from_config(&config.cdf)?;
    info!("Connected to CDF project: {}", client.project());
    Ok(SchemaLoaders::new(&Arc::new(client), cache))
}

fn create_deployer(config: &DeployConfig, overrides: DeployOverrides) -> Result<Deployer> {
    let loaders = create_loaders(config, overrides.cache(config))?;
    Ok(Deployer::new(loaders, overrides.options(config)))
}

/// Asks for confirmation on stderr.
fn confirm(prompt: &str) -> Result<bool> {
    eprint!("{prompt}");
    std::io::stderr().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}

/// Writes command output to stdout.
fn emit(output: &str) {
    let mut stdout = std::io::stdout().lock();
    let _ = writeln!(stdout, "{}", output.trim_end());
}

//! Cluster roles CLI entrypoint.
//!
//! This is the main entrypoint for the cluster-roles command-line tool.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use cluster_roles::cli::{Cli, Commands, OutputFormat, OutputFormatter};
use cluster_roles::cluster::Inventory;
use cluster_roles::config::{ClusterConfig, ConfigParser, ConfigValidator, find_config_file};
use cluster_roles::error::{ClusterError, ConfigError, Result};
use cluster_roles::facts::{FactCollector, InventoryFactCollector, LocalProbe, SshProbe};
use cluster_roles::orchestrator::{Orchestrator, RunOptions};
use cluster_roles::planner::{DryRunExecutor, ExecutorAdapter};
use cluster_roles::roles::RoleCatalog;

use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse_args();

    // Initialize logging
    init_logging(cli.verbose, cli.output);

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
///
/// Logs go to stderr; JSON output mode also switches logs to JSON lines.
fn init_logging(verbose: bool, output: OutputFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    match output {
        OutputFormat::Json => builder.json().init(),
        OutputFormat::Text => builder.init(),
    }
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    let formatter = OutputFormatter::new(cli.output);
    let config_path = cli.config.as_ref();

    match cli.command {
        Commands::Init { path, force } => cmd_init(&path, force),
        Commands::Validate { warnings } => cmd_validate(config_path, warnings, &formatter),
        Commands::Roles => cmd_roles(config_path, &formatter),
        Commands::Nodes { cluster } => cmd_nodes(config_path, &cluster, &formatter),
        Commands::Facts {
            cluster,
            node,
            os_release,
        } => cmd_facts(config_path, &cluster, node, os_release, &formatter).await,
        Commands::Plan {
            cluster,
            node,
            detailed,
            os_release,
        } => cmd_plan(config_path, &cluster, node, detailed, os_release, &formatter).await,
        Commands::Simulate {
            cluster,
            node,
            fail,
            unchanged,
            timeout_secs,
            max_parallel,
            os_release,
        } => {
            let adapter = fail
                .into_iter()
                .fold(DryRunExecutor::new(), DryRunExecutor::with_failure);
            let adapter = unchanged
                .into_iter()
                .fold(adapter, DryRunExecutor::with_unchanged);
            let options = RunOptions {
                max_parallel,
                action_timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
                only_node: node,
            };
            cmd_simulate(
                config_path,
                &cluster,
                Arc::new(adapter),
                options,
                os_release,
                &formatter,
            )
            .await
        }
    }
}

/// Write an example configuration.
fn cmd_init(path: &Path, force: bool) -> Result<()> {
    info!("Initializing cluster configuration in: {}", path.display());

    let config_path = path.join("cluster.yaml");
    let env_path = path.join(".env.example");

    if !force && config_path.exists() {
        eprintln!("Configuration file already exists: {}", config_path.display());
        eprintln!("Use --force to overwrite.");
        return Ok(());
    }

    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }

    std::fs::write(&config_path, include_str!("../share/cluster.example.yaml"))?;
    eprintln!("Created: {}", config_path.display());

    std::fs::write(&env_path, include_str!("../share/env.example"))?;
    eprintln!("Created: {}", env_path.display());

    eprintln!("\nNext steps:");
    eprintln!("  1. Edit cluster.yaml with your node groups and roles");
    eprintln!("  2. Run 'cluster-roles validate' to check the configuration");
    eprintln!("  3. Run 'cluster-roles plan <cluster>' to see what each node gets");
    eprintln!("  4. Run 'cluster-roles simulate <cluster>' for a dry run");

    Ok(())
}

/// Validate configuration.
fn cmd_validate(
    config_path: Option<&PathBuf>,
    show_warnings: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let config_file = resolve_config_path(config_path)?;
    info!("Validating configuration: {}", config_file.display());

    let config = load_config(&config_file)?;
    let catalog = build_catalog(&config)?;
    let result = ConfigValidator::new(&catalog).check(&config);

    println!("{}", formatter.format_validation(&result, show_warnings));

    if result.is_valid() {
        eprintln!("\nConfiguration summary:");
        eprintln!("  Clusters: {}", config.cluster_names().join(", "));
        eprintln!("  Setups: {}", config.setup.len());
        eprintln!("  User roles: {}", config.roles.len());
        Ok(())
    } else {
        Err(ConfigError::validation(
            format!("{} error(s) found", result.error_count()),
            "config",
        )
        .into())
    }
}

/// List roles.
fn cmd_roles(config_path: Option<&PathBuf>, formatter: &OutputFormatter) -> Result<()> {
    // The built-in catalog is listed even without a configuration file.
    let catalog = match resolve_config_path(config_path) {
        Ok(config_file) => build_catalog(&load_config(&config_file)?)?,
        Err(ClusterError::Config(ConfigError::FileNotFound { .. })) if config_path.is_none() => {
            debug!("No configuration file, listing built-in roles only");
            RoleCatalog::builtin()?
        }
        Err(e) => return Err(e),
    };

    println!("{}", formatter.format_roles(&catalog));
    Ok(())
}

/// List nodes of a cluster.
fn cmd_nodes(
    config_path: Option<&PathBuf>,
    cluster: &str,
    formatter: &OutputFormatter,
) -> Result<()> {
    let (config, _catalog) = load_context(config_path)?;
    let inventory = build_inventory(&config, cluster)?;

    println!("{}", formatter.format_nodes(&inventory));
    Ok(())
}

/// Collect facts.
async fn cmd_facts(
    config_path: Option<&PathBuf>,
    cluster: &str,
    node: Option<String>,
    os_release: Option<PathBuf>,
    formatter: &OutputFormatter,
) -> Result<()> {
    let orchestrator = build_orchestrator(
        config_path,
        cluster,
        Arc::new(DryRunExecutor::new()),
        RunOptions {
            only_node: node,
            ..RunOptions::default()
        },
        os_release,
    )?;

    let facts = orchestrator.collect_facts().await?;
    println!("{}", formatter.format_facts(&facts));
    Ok(())
}

/// Show the action plan.
async fn cmd_plan(
    config_path: Option<&PathBuf>,
    cluster: &str,
    node: Option<String>,
    detailed: bool,
    os_release: Option<PathBuf>,
    formatter: &OutputFormatter,
) -> Result<()> {
    let orchestrator = build_orchestrator(
        config_path,
        cluster,
        Arc::new(DryRunExecutor::new()),
        RunOptions {
            only_node: node,
            ..RunOptions::default()
        },
        os_release,
    )?;

    let nodes = orchestrator.prepare().await?;
    println!("{}", formatter.format_plans(&nodes, detailed));
    Ok(())
}

/// Run the plan through a backend.
async fn cmd_simulate(
    config_path: Option<&PathBuf>,
    cluster: &str,
    adapter: Arc<dyn ExecutorAdapter>,
    options: RunOptions,
    os_release: Option<PathBuf>,
    formatter: &OutputFormatter,
) -> Result<()> {
    let orchestrator = build_orchestrator(config_path, cluster, adapter, options, os_release)?;

    let report = orchestrator.run().await?;
    println!("{}", formatter.format_report(&report));

    if report.is_success() {
        Ok(())
    } else {
        Err(ClusterError::internal(format!(
            "{} of {} node(s) failed",
            report.failed(),
            report.nodes.len()
        )))
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Resolves the configuration file path.
fn resolve_config_path(config_path: Option<&PathBuf>) -> Result<PathBuf> {
    config_path.map_or_else(|| find_config_file("."), |path| Ok(path.clone()))
}

/// Loads a configuration file and the `.env` file next to it.
fn load_config(config_file: &Path) -> Result<ClusterConfig> {
    debug!("Loading configuration from: {}", config_file.display());

    let parser = ConfigParser::new()
        .with_base_path(config_file.parent().unwrap_or_else(|| Path::new(".")));
    parser.load_dotenv()?;
    parser.load_with_env(config_file)
}

/// Builds the role catalog: built-in roles replaced by user roles.
fn build_catalog(config: &ClusterConfig) -> Result<RoleCatalog> {
    Ok(RoleCatalog::builtin()?.with_overrides(config.roles.iter().cloned()))
}

/// Loads and validates the configuration and builds the catalog.
fn load_context(config_path: Option<&PathBuf>) -> Result<(ClusterConfig, RoleCatalog)> {
    let config_file = resolve_config_path(config_path)?;
    let config = load_config(&config_file)?;
    let catalog = build_catalog(&config)?;

    let result = ConfigValidator::new(&catalog).validate(&config)?;
    for warning in &result.warnings {
        warn!("{warning}");
    }

    Ok((config, catalog))
}

/// Expands a cluster profile into its nodes.
fn build_inventory(config: &ClusterConfig, cluster: &str) -> Result<Inventory> {
    Inventory::from_config(config, cluster, &ConfigParser::var_overrides_from_env())
}

/// Wires the configuration, a fact collector and a backend together.
fn build_orchestrator(
    config_path: Option<&PathBuf>,
    cluster: &str,
    adapter: Arc<dyn ExecutorAdapter>,
    options: RunOptions,
    os_release: Option<PathBuf>,
) -> Result<Orchestrator> {
    let (config, catalog) = load_context(config_path)?;
    let inventory = Arc::new(build_inventory(&config, cluster)?);

    let collector: Arc<dyn FactCollector> = match os_release {
        Some(path) => {
            debug!("Reading os-release files from {}", path.display());
            Arc::new(InventoryFactCollector::new(
                Arc::clone(&inventory),
                LocalProbe::new(path),
            ))
        }
        None => {
            let probe = SshProbe::from_login(&inventory.login);
            Arc::new(InventoryFactCollector::new(Arc::clone(&inventory), probe))
        }
    };

    Ok(
        Orchestrator::new(Arc::new(catalog), inventory, collector, adapter)
            .with_options(options),
    )
}

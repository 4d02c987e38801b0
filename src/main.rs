mod colors;
mod commands;

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::time::Duration;
use tapkeg::{
    AgentDestination, BundleSource, FormulaIndex, InstallLayout, InstallRequest, PackageManager,
    VariantLabel, platform,
};

#[derive(Parser)]
#[command(name = "tapkeg")]
#[command(author, version, about = "Installs prebuilt, platform-specific binary bundles", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Install prefix (defaults to $TAPKEG_PREFIX, then /opt/homebrew or /usr/local)
    #[arg(long, global = true)]
    prefix: Option<PathBuf>,

    /// Directory of additional formula definitions (defaults to $TAPKEG_INDEX)
    #[arg(long, global = true)]
    index: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show information about a formula
    Info {
        /// Formula name
        formula: String,

        /// Print the formula definition as JSON
        #[arg(long)]
        json: bool,
    },

    /// List installed formulae
    List,

    /// Show the artifact to download for a platform
    Resolve {
        /// Formula name
        formula: String,

        /// Release channel (stable or prerelease)
        #[arg(long)]
        variant: Option<VariantLabel>,

        /// Operating system (defaults to this machine)
        #[arg(long)]
        os: Option<String>,

        /// CPU architecture (defaults to this machine)
        #[arg(long)]
        arch: Option<String>,
    },

    /// Install a formula from a downloaded or unpacked bundle
    Install {
        /// Formula name
        formula: String,

        /// Downloaded release archive (checksum is verified before unpacking)
        #[arg(long, conflicts_with = "bundle", required_unless_present = "bundle")]
        archive: Option<PathBuf>,

        /// Already verified and unpacked bundle directory
        #[arg(long)]
        bundle: Option<PathBuf>,

        /// Release channel (stable or prerelease)
        #[arg(long)]
        variant: Option<VariantLabel>,

        /// Where to put the agent archive (bin or libexec)
        #[arg(long)]
        agents_into: Option<AgentDestination>,

        /// Seconds to allow each subprocess before giving up
        #[arg(long)]
        timeout: Option<u64>,

        /// Print the install plan without running it
        #[arg(long)]
        dry_run: bool,

        /// Skip the post-install smoke test
        #[arg(long)]
        skip_test: bool,
    },

    /// Uninstall formulae
    Uninstall {
        /// Formula names
        #[arg(required = true)]
        formulae: Vec<String>,
    },

    /// Run the smoke test of an installed formula
    Test {
        /// Formula name
        formula: String,

        /// Seconds to allow the test before giving up
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Show post-install caveats of a formula
    Caveats {
        /// Formula name
        formula: String,

        /// Release channel (defaults to the installed one)
        #[arg(long)]
        variant: Option<VariantLabel>,
    },
}

fn load_index(dir: Option<PathBuf>) -> anyhow::Result<FormulaIndex> {
    let mut index = FormulaIndex::builtin()?;
    let dir = dir.or_else(|| std::env::var_os("TAPKEG_INDEX").map(PathBuf::from));
    if let Some(dir) = dir {
        let count = index
            .load_dir(&dir)
            .with_context(|| format!("Failed to load formulae from {}", dir.display()))?;
        tracing::debug!("Loaded {} formulae from {}", count, dir.display());
    }
    Ok(index)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    colors::init_colors();

    let layout = match cli.prefix {
        Some(prefix) => InstallLayout::from_prefix(prefix),
        None => InstallLayout::detect(),
    };
    let index = load_index(cli.index)?;

    match cli.command {
        Some(Commands::Info { formula, json }) => {
            let pm = PackageManager::with_index(index, layout);
            commands::info(&pm, &formula, json)?;
        }
        Some(Commands::List) => {
            let pm = PackageManager::with_index(index, layout);
            commands::list(&pm)?;
        }
        Some(Commands::Resolve {
            formula,
            variant,
            os,
            arch,
        }) => {
            let platform = platform::resolve_host(os.as_deref(), arch.as_deref())?;
            let pm = PackageManager::with_index(index, layout);
            commands::resolve(&pm, &formula, variant, platform)?;
        }
        Some(Commands::Install {
            formula,
            archive,
            bundle,
            variant,
            agents_into,
            timeout,
            dry_run,
            skip_test,
        }) => {
            let source = match (archive, bundle) {
                (Some(archive), _) => BundleSource::Archive(archive),
                (None, Some(bundle)) => BundleSource::Unpacked(bundle),
                (None, None) => anyhow::bail!("one of --archive or --bundle is required"),
            };
            let mut request = InstallRequest::new(formula, source);
            request.variant = variant;
            request.skip_test = skip_test;

            let pm = PackageManager::with_index(index, layout.with_agent_destination(agents_into))
                .with_timeout(timeout.map(Duration::from_secs));
            commands::install(&pm, &request, dry_run).await?;
        }
        Some(Commands::Uninstall { formulae }) => {
            let pm = PackageManager::with_index(index, layout);
            commands::uninstall(&pm, &formulae)?;
        }
        Some(Commands::Test { formula, timeout }) => {
            let pm = PackageManager::with_index(index, layout)
                .with_timeout(timeout.map(Duration::from_secs));
            commands::test(&pm, &formula).await?;
        }
        Some(Commands::Caveats { formula, variant }) => {
            let pm = PackageManager::with_index(index, layout);
            commands::caveats(&pm, &formula, variant)?;
        }
        None => {
            println!(
                "{} - installs prebuilt binary bundles",
                "tapkeg".bold()
            );
            println!("\nRun {} to see available commands.", "tapkeg --help".cyan());
        }
    }

    Ok(())
}

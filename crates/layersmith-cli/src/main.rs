mod commands;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::{EXIT_FAILURE, EXIT_MANIFEST_ERROR};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "layersmith",
    version,
    about = "Build deployable dependency layers for Python and Node.js functions"
)]
struct Cli {
    /// Path to the layer manifest.
    #[arg(long, default_value = "layers.yaml", global = true)]
    manifest: PathBuf,

    /// Path to a layersmith.toml configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List the layers declared in the manifest.
    List,
    /// Build layer archives (all layers when none are named).
    Build {
        /// Layers to build.
        layers: Vec<String>,
        /// Continue with the remaining layers after a failure.
        #[arg(long, default_value_t = false)]
        keep_going: bool,
        /// Directory archives are written to (overrides config).
        #[arg(long)]
        output_dir: Option<PathBuf>,
        /// Timeout in seconds for each external command (overrides config).
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Publish already built archives to the layer registry.
    Publish {
        /// Layers to publish.
        layers: Vec<String>,
        /// Directory the archives were written to (overrides config).
        #[arg(long)]
        output_dir: Option<PathBuf>,
        /// Registry region (overrides config).
        #[arg(long)]
        region: Option<String>,
        /// Credentials profile (overrides config).
        #[arg(long)]
        profile: Option<String>,
    },
    /// Check that an archive contains the given entries.
    Verify {
        /// Archive to check.
        archive: PathBuf,
        /// Entry paths that must be present, e.g. python/requests/__init__.py.
        #[arg(required = true)]
        files: Vec<String>,
    },
    /// Show the layer configuration embedded in an archive.
    Inspect {
        /// Archive to inspect.
        archive: PathBuf,
    },
    /// Check that the host tools needed by the manifest's layers are installed.
    Doctor,
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
    /// Generate man pages in the specified directory.
    ManPages {
        /// Output directory for man pages.
        #[arg(default_value = "man")]
        dir: PathBuf,
    },
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("LAYERSMITH_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let json_output = cli.json;
    let config = cli.config.as_deref();

    let result = match cli.command {
        Commands::List => commands::list::run(&cli.manifest, json_output),
        Commands::Build {
            layers,
            keep_going,
            output_dir,
            timeout,
        } => commands::build::run(
            &cli.manifest,
            config,
            &layers,
            commands::build::BuildArgs {
                keep_going,
                output_dir,
                timeout,
            },
            json_output,
        ),
        Commands::Publish {
            layers,
            output_dir,
            region,
            profile,
        } => commands::publish::run(
            &cli.manifest,
            config,
            &layers,
            commands::publish::PublishArgs {
                output_dir,
                region,
                profile,
            },
            json_output,
        ),
        Commands::Verify { archive, files } => {
            commands::verify::run(&archive, &files, json_output)
        }
        Commands::Inspect { archive } => commands::inspect::run(&archive, json_output),
        Commands::Doctor => commands::doctor::run(&cli.manifest, config, json_output),
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
        Commands::ManPages { dir } => commands::man_pages::run::<Cli>(&dir),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            let code = if msg.starts_with(commands::MANIFEST_ERROR_PREFIX) {
                EXIT_MANIFEST_ERROR
            } else {
                EXIT_FAILURE
            };
            ExitCode::from(code)
        }
    }
}

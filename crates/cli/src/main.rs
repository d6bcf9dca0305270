use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use stamp_annotate::{AnnotationFields, DialectRegistry};
use stamp_tracker::{
    ChangeDispatcher, CommandGit, FileScanner, FsHost, GitCollaborator, NullGit, TrackerConfig,
    TrackerRegistry, UpdateAction, WorkspacePolicy,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

#[derive(Parser)]
#[command(name = "stamp")]
#[command(about = "Keeps last-modified annotations current in source files", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log only warnings and errors
    #[arg(long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch a workspace and annotate files as they change
    Watch {
        /// Workspace root to watch
        #[arg(default_value = ".")]
        root: PathBuf,

        /// TOML config file; missing file falls back to defaults
        #[arg(long, default_value = "stamp.toml")]
        config: PathBuf,

        /// Override the debounce window in milliseconds
        #[arg(long)]
        debounce_ms: Option<u64>,

        /// Stage annotated files with git
        #[arg(long)]
        auto_commit: bool,
    },

    /// Annotate a single file once and exit
    Annotate {
        file: PathBuf,

        /// strftime format for rendered timestamps
        #[arg(long)]
        timestamp_format: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    match cli.command {
        Commands::Watch {
            root,
            config,
            debounce_ms,
            auto_commit,
        } => run_watch(&root, &config, debounce_ms, auto_commit).await,
        Commands::Annotate {
            file,
            timestamp_format,
        } => annotate_once(&file, timestamp_format.as_deref()),
    }
}

async fn run_watch(
    root: &Path,
    config_path: &Path,
    debounce_ms: Option<u64>,
    auto_commit: bool,
) -> Result<()> {
    let root = root
        .canonicalize()
        .with_context(|| format!("workspace root {} not found", root.display()))?;

    let mut config = load_config(config_path)?;
    if let Some(debounce_ms) = debounce_ms {
        config.debounce_ms = debounce_ms;
    }
    if auto_commit {
        config.enable_auto_commit = true;
    }

    let policy = Arc::new(WorkspacePolicy::new(&root));
    let mut registry = TrackerRegistry::new();
    let seeded = FileScanner::new(&root).seed(&mut registry, policy.as_ref());
    log::info!("tracking {seeded} files under {}", root.display());

    let git: Arc<dyn GitCollaborator> = if config.enable_auto_commit {
        Arc::new(CommandGit::new(&root))
    } else {
        Arc::new(NullGit)
    };

    let tracker = ChangeDispatcher::start(
        &root,
        config,
        registry,
        policy,
        Arc::new(FsHost),
        git,
    )?;

    let mut updates = tracker.subscribe_updates();
    tokio::spawn(async move {
        loop {
            match updates.recv().await {
                Ok(update) => match update.action {
                    UpdateAction::Annotated => log::info!("annotated {}", update.path.display()),
                    UpdateAction::Recorded => log::info!("recorded {}", update.path.display()),
                    UpdateAction::Removed => log::info!("untracked {}", update.path.display()),
                },
                Err(RecvError::Lagged(skipped)) => log::warn!("missed {skipped} updates"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    log::info!("shutting down");
    drop(tracker);
    Ok(())
}

fn annotate_once(file: &Path, timestamp_format: Option<&str>) -> Result<()> {
    let Some(dialect) = DialectRegistry::builtin().resolve(file) else {
        bail!("no comment dialect for {}", file.display());
    };
    let meta = fs::metadata(file).with_context(|| format!("cannot stat {}", file.display()))?;
    let fields = AnnotationFields::new(
        meta.modified()
            .with_context(|| format!("no mtime for {}", file.display()))?,
    )
    .with_size(meta.len());

    let contents =
        fs::read_to_string(file).with_context(|| format!("cannot read {}", file.display()))?;
    let format = timestamp_format.unwrap_or(stamp_annotate::DEFAULT_TIMESTAMP_FORMAT);
    let rewritten = stamp_annotate::replace(&contents, dialect, &fields, format);
    fs::write(file, rewritten).with_context(|| format!("cannot write {}", file.display()))?;

    println!("annotated {}", file.display());
    Ok(())
}

fn load_config(path: &Path) -> Result<TrackerConfig> {
    if !path.exists() {
        return Ok(TrackerConfig::default());
    }
    let raw =
        fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("invalid config in {}", path.display()))
}

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use starling_bot::application::publish::{CommandPublisher, LogPublisher};
use starling_bot::infrastructure::adapters::console::ConsoleAdapter;
use starling_bot::infrastructure::config::Config;
use starling_bot::infrastructure::plugins::{autofix, PluginLoader, PluginWatcher, ReloadOptions};
use starling_bot::infrastructure::runtime::ScriptEngine;

#[derive(Parser)]
#[command(name = "starling-bot")]
#[command(about = "A chat bot runtime with hot-reloadable plugins", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.yaml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the bot
    Run,
    /// Analyze a plugin file for fixable syntax mistakes
    Check {
        /// Plugin source file
        file: PathBuf,
        /// Apply the fixes instead of only reporting them
        #[arg(long)]
        fix: bool,
    },
    /// Show version
    Version,
    /// Generate default config
    InitConfig,
}

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run => {
            run_bot(cli.config).await;
        }
        Commands::Check { file, fix } => {
            check_plugin(file, fix).await;
        }
        Commands::Version => {
            println!("starling-bot v{}", env!("CARGO_PKG_VERSION"));
        }
        Commands::InitConfig => {
            init_config();
        }
    }
}

async fn run_bot(config_path: String) {
    // Load config
    let config = if std::path::Path::new(&config_path).exists() {
        Config::load(&config_path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config: {}, using defaults", e);
            Config::load_env()
        })
    } else {
        Config::load_env()
    };

    tracing::info!("Starting {}", config.bot.name);

    let engine = match ScriptEngine::new(&config.plugins.roots) {
        Ok(engine) => Arc::new(engine),
        Err(e) => {
            tracing::error!("Failed to initialize script runtime: {}", e);
            return;
        }
    };

    let loader = Arc::new(PluginLoader::new(&config, engine));
    let publisher: Arc<dyn CommandPublisher> = Arc::new(LogPublisher);

    // Initial load, then announce the command set
    loader.reload(ReloadOptions::default()).await;
    let metadata = loader.registry().snapshot().command_metadata();
    if let Err(e) = publisher.publish(&metadata).await {
        tracing::warn!("Command publication failed: {}", e);
    }

    // Hot reload on plugin source changes
    let watcher = if config.plugins.watch.enabled {
        match PluginWatcher::spawn(loader.clone(), publisher.clone(), config.debounce()) {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                tracing::error!("Failed to start plugin watcher: {}", e);
                None
            }
        }
    } else {
        None
    };

    ConsoleAdapter::new(config.bot.clone()).run(loader).await;

    if let Some(watcher) = watcher {
        watcher.stop();
    }
    tracing::info!("Shutting down");
}

async fn check_plugin(file: PathBuf, fix: bool) {
    let source = match std::fs::read_to_string(&file) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Cannot read {}: {}", file.display(), e);
            return;
        }
    };

    match ScriptEngine::syntax_check(&source, &file.display().to_string()) {
        Ok(()) => println!("{}: syntax OK", file.display()),
        Err(e) => println!("{}: {}", file.display(), e),
    }

    let analysis = autofix::analyze(&source);
    if analysis.errors.is_empty() {
        println!("No fixable patterns detected");
        return;
    }

    for issue in &analysis.errors {
        println!("  line {}: {} ({})", issue.line, issue.description, issue.excerpt);
    }

    if fix {
        match autofix::auto_fix_file(&file, Duration::from_secs(5)).await {
            Ok(applied) => println!(
                "Applied {} fix(es), original backed up to {}",
                applied.fixes.len(),
                applied.backup_path.display()
            ),
            Err(e) => println!("Auto-fix failed: {}", e),
        }
    } else {
        println!(
            "{} candidate fix(es); re-run with --fix to apply",
            analysis.fixes.len()
        );
    }
}

fn init_config() {
    if std::path::Path::new("config.yaml").exists() {
        println!("config.yaml already exists");
        return;
    }
    match Config::write_default("config.yaml") {
        Ok(()) => println!("Wrote config.yaml"),
        Err(e) => eprintln!("Failed to write config: {}", e),
    }
}

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use modsync::{
    find_entry, BarProgress, ClientConfig, Installer, LogProgress, ManifestParser,
    ModEntry, Progress, RootDiscovery, Transfer,
};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "modsync")]
#[command(about = "Discover, download and install game mods from mirrored manifests", long_about = None)]
#[command(version)]
struct Args {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Archive tool to call for extraction (7-Zip compatible)
    #[arg(long, global = true)]
    archive_tool: Option<String>,

    /// Extra attempts per mirror
    #[arg(long, global = true)]
    retries: Option<usize>,

    /// Pause between attempts on the same mirror (e.g. "500ms", "2s")
    #[arg(long, global = true, value_parser = humantime::parse_duration)]
    retry_interval: Option<std::time::Duration>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the latest version published on the home mirrors
    Version,
    /// List all mods announced by the home mirrors
    List {
        /// Print entries as JSON
        #[arg(long)]
        json: bool,
    },
    /// Parse a local manifest file and print its entries
    Parse {
        file: PathBuf,
        /// Print entries as JSON
        #[arg(long)]
        json: bool,
    },
    /// Install or update mods into a game directory
    Install {
        /// Game root directory
        #[arg(short, long)]
        game_dir: PathBuf,

        /// Manifest file or URL (defaults to everything the home mirrors list)
        #[arg(short, long)]
        manifest: Option<String>,

        /// Only download these files (comma-separated)
        #[arg(long, value_delimiter = ',')]
        files: Vec<String>,

        /// Names of the entries to install
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Check that the archive tool can be run
    CheckTool,
}

fn load_config(args: &Args) -> anyhow::Result<ClientConfig> {
    let mut config = match &args.config {
        Some(path) => ClientConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => ClientConfig::default(),
    };

    if let Some(tool) = &args.archive_tool {
        config.archive_tool = tool.clone();
    }
    if let Some(retries) = args.retries {
        config.download_retries = retries;
    }
    if let Some(interval) = args.retry_interval {
        config.retry_interval_ms = interval.as_millis() as u64;
    }
    Ok(config)
}

fn print_tree(entry: &ModEntry, depth: usize) {
    let folder = if entry.install_folder.is_empty() {
        "/"
    } else {
        entry.install_folder.as_str()
    };
    println!(
        "{}{} [{}] -> {}",
        "  ".repeat(depth),
        entry.name,
        entry.version,
        folder
    );
    for sub in &entry.sub_entries {
        print_tree(sub, depth + 1);
    }
}

fn print_entries(entries: &[ModEntry], json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(entries)?);
    } else {
        for entry in entries {
            print_tree(entry, 0);
        }
    }
    Ok(())
}

async fn load_manifest(transfer: &Transfer, source: &str) -> anyhow::Result<Vec<ModEntry>> {
    let text = if source.contains("://") {
        transfer
            .get(source)
            .await?
            .ok()
            .with_context(|| format!("{} answered 304 Not Modified", source))?
    } else {
        std::fs::read_to_string(Path::new(source))
            .with_context(|| format!("failed to read {}", source))?
    };

    let outcome = ManifestParser::parse_document(&text);
    for w in &outcome.warnings {
        warn!("Manifest {}: {}", source, w);
    }
    if let Some(e) = &outcome.error {
        warn!("Manifest {} is damaged: {}", source, e);
    }
    Ok(outcome.entries)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(format!("modsync={}", log_level))
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&args)?;
    let transfer = Transfer::new(&config)?;

    match &args.command {
        Command::Version => {
            let discovery = RootDiscovery::new(transfer, config.home_urls.clone());
            match discovery.get_version().await {
                Some(version) => {
                    println!("{}", version.version);
                    if let Some(link) = version.link {
                        println!("{}", link);
                    }
                }
                None => bail!("no home mirror answered"),
            }
        }
        Command::List { json } => {
            let discovery = RootDiscovery::new(transfer, config.home_urls.clone());
            let mods = discovery.get_mods().await;
            info!("Found {} mod(s)", mods.len());
            print_entries(&mods, *json)?;
        }
        Command::Parse { file, json } => {
            let entries = load_manifest(&transfer, &file.to_string_lossy()).await?;
            print_entries(&entries, *json)?;
        }
        Command::CheckTool => {
            let installer = Installer::new(&config, Arc::new(LogProgress::default()))?;
            if installer.check_tool().await {
                println!("✅ {} is usable", config.archive_tool);
            } else {
                bail!("{} could not be run", config.archive_tool);
            }
        }
        Command::Install {
            game_dir,
            manifest,
            files,
            names,
        } => {
            let entries = match manifest {
                Some(source) => load_manifest(&transfer, source).await?,
                None => {
                    RootDiscovery::new(transfer, config.home_urls.clone())
                        .get_mods()
                        .await
                }
            };

            let bar = atty::is(atty::Stream::Stderr).then(|| Arc::new(BarProgress::new()));
            let progress: Arc<dyn Progress> = match &bar {
                Some(bar) => bar.clone() as Arc<dyn Progress>,
                None => Arc::new(LogProgress::default()),
            };

            let installer = Installer::new(&config, progress)?;
            if !installer.check_tool().await {
                warn!(
                    "⚠️  {} is not usable; archives will not be extracted",
                    config.archive_tool
                );
            }

            let selection: Option<HashSet<String>> =
                (!files.is_empty()).then(|| files.iter().cloned().collect());

            std::fs::create_dir_all(game_dir)?;
            let mut failures = 0;

            for name in names {
                let Some(entry) = find_entry(&entries, name) else {
                    error!("❌ No mod named \"{}\"", name);
                    failures += 1;
                    continue;
                };

                let report = installer.setup(entry, game_dir, selection.as_ref()).await?;
                if !report.is_success() {
                    failures += 1;
                    warn!(
                        "Failed downloads: {:?}, failed extractions: {:?}, hash mismatches: {:?}",
                        report.failed_downloads,
                        report.failed_extractions,
                        report.hash_mismatches
                    );
                }
            }

            if let Some(bar) = bar {
                bar.finish_with_message("Done");
            }

            if failures > 0 {
                error!("❌ {} of {} install(s) had problems", failures, names.len());
                std::process::exit(1);
            }
            info!("✅ All installs completed successfully!");
        }
    }

    Ok(())
}

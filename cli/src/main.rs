//! Launcher - command-line front end for the download engine.
//!
//! Lists the built-in games, installs them from their release assets with a
//! live progress bar, verifies installed files and optionally launches the
//! installed binary. This binary is the "caller" of the engine: it drains
//! session events on its main thread and turns Ctrl-C into a cancel request.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use engine::{
    builtin_catalog, coalesce_progress, compute_file_checksum, find_game, CancelFlag,
    ChecksumAlgorithm, DownloadConfig, DownloadController, DownloadEvent, DownloadTarget,
    SessionReport, TransferOutcome,
};

/// How often the event loop wakes up to check for Ctrl-C.
const INTERRUPT_POLL: Duration = Duration::from_millis(100);

/// Launcher - install and run games from their release assets
#[derive(Parser, Debug)]
#[command(name = "launcher")]
#[command(version)]
#[command(about = "Download, verify and launch release binaries")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory games are installed into
    #[arg(long, value_name = "DIR", global = true)]
    install_dir: Option<PathBuf>,

    /// Checksum algorithm: md5, sha256 or blake3
    #[arg(long, value_name = "ALGORITHM", default_value = "md5", global = true)]
    hash: String,

    /// User-Agent header sent to the release host
    #[arg(long, value_name = "AGENT", global = true)]
    user_agent: Option<String>,

    /// Read/write buffer size in bytes
    #[arg(long, value_name = "BYTES", global = true)]
    buffer_size: Option<usize>,

    /// Print session events as JSON lines instead of a progress bar
    #[arg(long, global = true)]
    json: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List known games and whether they are installed
    List,

    /// Download a game from the catalog
    Install {
        /// Game title or file name
        game: String,

        /// Download again even if the file is already present
        #[arg(long)]
        force: bool,

        /// Run the binary after a successful install
        #[arg(long)]
        launch: bool,
    },

    /// Download an arbitrary release asset
    Fetch {
        /// Asset URL
        #[arg(long, value_name = "URL")]
        url: String,

        /// Destination file
        #[arg(long, value_name = "PATH")]
        output: PathBuf,
    },

    /// Compute the checksum of a downloaded file
    Verify {
        /// File to hash
        file: PathBuf,
    },
}

#[derive(Debug, PartialEq)]
enum CliError {
    Failed(String),
    Cancelled,
}

impl From<String> for CliError {
    fn from(message: String) -> Self {
        CliError::Failed(message)
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "debug,reqwest=warn,hyper=warn"
    } else {
        "info,reqwest=warn,hyper=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let interrupt = CancelFlag::new();
    let handler_flag = interrupt.clone();
    if let Err(e) = ctrlc::set_handler(move || handler_flag.cancel()) {
        eprintln!("Warning: could not install Ctrl-C handler: {}", e);
    }

    let exit_code = match run_cli(&cli, &interrupt) {
        Ok(()) => 0,
        Err(CliError::Cancelled) => {
            eprintln!("Download cancelled");
            130
        }
        Err(CliError::Failed(msg)) => {
            eprintln!("Error: {}", msg);
            2
        }
    };

    std::process::exit(exit_code);
}

/// Build the engine configuration from command-line overrides.
fn build_config(cli: &Cli) -> Result<DownloadConfig, String> {
    let mut config = DownloadConfig::default();
    if let Some(dir) = &cli.install_dir {
        config.install_dir = dir.clone();
    }
    if let Some(agent) = &cli.user_agent {
        config.user_agent = agent.clone();
    }
    if let Some(size) = cli.buffer_size {
        config.buffer_size = size;
    }
    config.checksum_algorithm = cli
        .hash
        .parse::<ChecksumAlgorithm>()
        .map_err(|e| e.to_string())?;
    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

/// Main CLI logic - separated from `main` for testability
fn run_cli(cli: &Cli, interrupt: &CancelFlag) -> Result<(), CliError> {
    let config = build_config(cli)?;
    debug!(?config, "configuration");

    match &cli.command {
        Commands::List => {
            list_games(&config.install_dir);
            Ok(())
        }
        Commands::Install {
            game,
            force,
            launch,
        } => {
            let catalog = builtin_catalog();
            let game = find_game(&catalog, game).map_err(|e| e.to_string())?;
            let target = game.target(&config.install_dir);

            if game.is_installed(&config.install_dir) && !force {
                eprintln!(
                    "{} is already installed at {} (use --force to download again)",
                    game.title,
                    target.destination_path.display()
                );
            } else {
                eprintln!("Installing {} {} ({})", game.title, game.version, game.size_label);
                let report = download(config.clone(), target.clone(), cli.json, interrupt)?;
                print_summary(&report);
            }

            if *launch {
                launch_binary(&target.destination_path)?;
            }
            Ok(())
        }
        Commands::Fetch { url, output } => {
            let file_name = output
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| format!("Output path has no file name: {}", output.display()))?;
            let directory = output.parent().unwrap_or_else(|| Path::new(""));
            let target = DownloadTarget::new(url.clone(), directory, file_name);
            let report = download(config, target, cli.json, interrupt)?;
            print_summary(&report);
            Ok(())
        }
        Commands::Verify { file } => {
            let checksum = compute_file_checksum(file, config.checksum_algorithm)
                .map_err(|e| e.to_string())?;
            println!("{}  {}", checksum.to_string_with_algo(), file.display());
            Ok(())
        }
    }
}

fn list_games(install_dir: &Path) {
    for game in builtin_catalog() {
        let status = if game.is_installed(install_dir) {
            "installed"
        } else {
            "not installed"
        };
        println!(
            "{:<16} {:<6} {:>7}  {:<14} {}",
            game.title,
            game.version,
            game.size_label,
            status,
            game.asset.url()
        );
    }
}

/// Run one download session and render its events until it finishes.
fn download(
    config: DownloadConfig,
    target: DownloadTarget,
    json: bool,
    interrupt: &CancelFlag,
) -> Result<SessionReport, CliError> {
    let controller = DownloadController::with_http(config).map_err(|e| e.to_string())?;
    let events = controller.subscribe();
    controller
        .start(target)
        .map_err(|e| e.to_string())?;

    let mut renderer = EventRenderer::new(json);
    let report = loop {
        if interrupt.is_cancelled() {
            controller.cancel();
        }

        let first = match events.recv_timeout(INTERRUPT_POLL) {
            Ok(event) => event,
            Err(e) if e.is_timeout() => continue,
            Err(_) => return Err(CliError::Failed("download worker stopped unexpectedly".to_string())),
        };

        let batch = std::iter::once(first).chain(events.try_iter());
        let mut finished = None;
        for event in coalesce_progress(batch) {
            renderer.render(&event);
            if let DownloadEvent::Finished(report) = event {
                finished = Some(report);
            }
        }
        if let Some(report) = finished {
            break report;
        }
    };

    controller.acknowledge().map_err(|e| e.to_string())?;

    match &report.outcome {
        TransferOutcome::Success { .. } => Ok(report),
        outcome if outcome.is_cancelled() => Err(CliError::Cancelled),
        TransferOutcome::Failure { reason, message } => {
            Err(CliError::Failed(format!("Download failed ({}): {}", reason, message)))
        }
    }
}

/// Turns session events into terminal output.
struct EventRenderer {
    json: bool,
    bar: Option<ProgressBar>,
}

impl EventRenderer {
    fn new(json: bool) -> Self {
        EventRenderer { json, bar: None }
    }

    fn render(&mut self, event: &DownloadEvent) {
        if self.json {
            match serde_json::to_string(event) {
                Ok(line) => println!("{}", line),
                Err(e) => eprintln!("Warning: could not encode event: {}", e),
            }
            return;
        }

        match event {
            DownloadEvent::Started { target, .. } => {
                eprintln!("Downloading {}", target.remote_url);
            }
            DownloadEvent::Progress { progress, .. } => {
                let bar = self.bar.get_or_insert_with(|| new_bar(progress.total_bytes));
                bar.set_position(progress.bytes_transferred);
                bar.set_message(format!("{:.2} MB/s", progress.rate_mbps));
            }
            DownloadEvent::Verifying { algorithm, .. } => {
                if let Some(bar) = &self.bar {
                    bar.set_message(format!("verifying ({})", algorithm));
                }
            }
            DownloadEvent::Finished(_) => {
                if let Some(bar) = self.bar.take() {
                    bar.finish_and_clear();
                }
            }
        }
    }
}

fn new_bar(total_bytes: u64) -> ProgressBar {
    if total_bytes > 0 {
        let bar = ProgressBar::new(total_bytes);
        if let Ok(style) = ProgressStyle::with_template(
            "[{bar:40.cyan/blue}] {percent:>3}% {bytes}/{total_bytes} {msg}",
        ) {
            bar.set_style(style.progress_chars("=> "));
        }
        bar
    } else {
        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner} {bytes} {msg}") {
            bar.set_style(style);
        }
        bar
    }
}

fn print_summary(report: &SessionReport) {
    if let TransferOutcome::Success {
        final_size_bytes,
        checksum,
    } = &report.outcome
    {
        let elapsed = report.finished_at - report.started_at;
        eprintln!("Download complete!");
        eprintln!("  File: {}", report.target.destination_path.display());
        eprintln!("  Size: {:.1} MB", *final_size_bytes as f64 / 1024.0 / 1024.0);
        eprintln!("  {}: {}", checksum.algorithm().to_string().to_uppercase(), checksum.hex());
        eprintln!("  Elapsed: {:.1}s", elapsed.num_milliseconds() as f64 / 1000.0);
    }
}

/// Start the installed binary and wait for it to exit.
fn launch_binary(path: &Path) -> Result<(), CliError> {
    if !path.is_file() {
        return Err(CliError::Failed(format!("Not installed: {}", path.display())));
    }
    info!(path = %path.display(), "launching");
    let status = Command::new(path)
        .status()
        .map_err(|e| format!("Could not start {}: {}", path.display(), e))?;
    info!(%status, "game exited");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).expect("Arguments should parse")
    }

    #[test]
    fn test_parse_install_with_flags() {
        let cli = parse(&["launcher", "install", "Target Game", "--launch", "--hash", "sha256"]);
        match cli.command {
            Commands::Install { game, force, launch } => {
                assert_eq!(game, "Target Game");
                assert!(!force);
                assert!(launch);
            }
            other => panic!("unexpected command: {:?}", other),
        }
        assert_eq!(cli.hash, "sha256");
    }

    #[test]
    fn test_parse_requires_subcommand() {
        assert!(Cli::try_parse_from(["launcher"]).is_err());
    }

    #[test]
    fn test_build_config_applies_overrides() {
        let cli = parse(&[
            "launcher",
            "list",
            "--install-dir",
            "/tmp/games",
            "--buffer-size",
            "4096",
            "--user-agent",
            "Test-Agent",
            "--hash",
            "blake3",
        ]);
        let config = build_config(&cli).expect("Config should build");
        assert_eq!(config.install_dir, PathBuf::from("/tmp/games"));
        assert_eq!(config.buffer_size, 4096);
        assert_eq!(config.user_agent, "Test-Agent");
        assert_eq!(config.checksum_algorithm, ChecksumAlgorithm::Blake3);
    }

    #[test]
    fn test_cli_rejects_invalid_hash_algorithm() {
        let cli = parse(&["launcher", "list", "--hash", "crc32"]);
        let result = run_cli(&cli, &CancelFlag::new());
        assert!(matches!(result, Err(CliError::Failed(_))));
    }

    #[test]
    fn test_cli_rejects_zero_buffer() {
        let cli = parse(&["launcher", "list", "--buffer-size", "0"]);
        assert!(build_config(&cli).is_err());
    }

    #[test]
    fn test_cli_list_succeeds() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let dir_arg = dir.path().to_string_lossy().to_string();
        let cli = parse(&["launcher", "list", "--install-dir", &dir_arg]);
        assert_eq!(run_cli(&cli, &CancelFlag::new()), Ok(()));
    }

    #[test]
    fn test_cli_install_rejects_unknown_game() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let dir_arg = dir.path().to_string_lossy().to_string();
        let cli = parse(&["launcher", "install", "tetris", "--install-dir", &dir_arg]);
        let result = run_cli(&cli, &CancelFlag::new());
        assert!(matches!(result, Err(CliError::Failed(msg)) if msg.contains("tetris")));
    }

    #[test]
    fn test_cli_install_skips_existing_file() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        std::fs::write(dir.path().join("target_game.exe"), b"MZ").expect("Failed to write file");
        let dir_arg = dir.path().to_string_lossy().to_string();
        let cli = parse(&["launcher", "install", "target game", "--install-dir", &dir_arg]);
        assert_eq!(run_cli(&cli, &CancelFlag::new()), Ok(()));
        assert_eq!(
            std::fs::read(dir.path().join("target_game.exe")).expect("read"),
            b"MZ"
        );
    }

    #[test]
    fn test_cli_verify_file() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let file = dir.path().join("game.exe");
        std::fs::write(&file, "hello").expect("Failed to write file");
        let file_arg = file.to_string_lossy().to_string();
        let cli = parse(&["launcher", "verify", &file_arg]);
        assert_eq!(run_cli(&cli, &CancelFlag::new()), Ok(()));
    }

    #[test]
    fn test_cli_verify_missing_file() {
        let cli = parse(&["launcher", "verify", "/nonexistent/game.exe"]);
        assert!(run_cli(&cli, &CancelFlag::new()).is_err());
    }

    #[test]
    fn test_cli_fetch_invalid_url_fails_without_file() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let output = dir.path().join("asset.bin");
        let output_arg = output.to_string_lossy().to_string();
        let cli = parse(&["launcher", "fetch", "--url", "not a url", "--output", &output_arg]);
        let result = run_cli(&cli, &CancelFlag::new());
        assert!(matches!(result, Err(CliError::Failed(_))));
        assert!(!output.exists());
    }

    #[test]
    fn test_launch_requires_installed_file() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let result = launch_binary(&dir.path().join("missing.exe"));
        assert!(matches!(result, Err(CliError::Failed(_))));
    }
}

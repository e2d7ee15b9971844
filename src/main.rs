//! md-open - preview markdown files in the browser.
//!
//! Usage:
//!   md-open [--port 3000] [--no-open] <files...>
//!   md-open --tmux-pane %3 notes.md          # with tmux catchup panel
//!   md-open --use-claude-code plan.md        # pane taken from $TMUX_PANE

use std::path::PathBuf;
use std::process::exit;

use clap::{CommandFactory, Parser};
use tracing::{info, warn};

use md_open::config::{ServerConfig, DEFAULT_PORT};

const PANE_ENV: &str = "TMUX_PANE";

#[derive(Parser, Debug)]
#[command(name = "md-open")]
#[command(about = "Preview markdown files in browser")]
#[command(disable_version_flag = true)]
struct Args {
    /// Markdown files to serve
    files: Vec<PathBuf>,

    /// Port number
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Don't open browser automatically
    #[arg(long)]
    no_open: bool,

    /// Enable tmux catchup UI with specified pane
    #[arg(long, value_name = "ID")]
    tmux_pane: Option<String>,

    /// Auto-detect tmux pane from TMUX_PANE env var
    #[arg(long)]
    use_claude_code: bool,

    /// Show version
    #[arg(short = 'v', long)]
    version: bool,
}

/// Keep files that exist, warning about the rest.
fn existing_files(files: Vec<PathBuf>) -> Vec<PathBuf> {
    files
        .into_iter()
        .filter(|file| {
            let exists = file.exists();
            if !exists {
                warn!("File not found: {}", file.display());
            }
            exists
        })
        .collect()
}

fn resolve_pane(explicit: Option<String>, use_env: bool) -> Option<String> {
    if explicit.is_some() || !use_env {
        return explicit;
    }
    match std::env::var(PANE_ENV) {
        Ok(pane) if !pane.is_empty() => Some(pane),
        _ => {
            warn!("{} environment variable is not set. Catchup UI disabled.", PANE_ENV);
            None
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    if args.version {
        println!("md-open version {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    if args.files.is_empty() {
        let _ = Args::command().print_help();
        exit(1);
    }

    let files = existing_files(args.files);
    if files.is_empty() {
        eprintln!("Error: No valid files found");
        exit(1);
    }

    let mut config = ServerConfig::new(files).with_port(args.port);
    config.tmux_pane = resolve_pane(args.tmux_pane, args.use_claude_code);

    let server = match md_open::start(config).await {
        Ok(server) => server,
        Err(e) => {
            eprintln!("Error: {}", e);
            exit(1);
        }
    };

    println!("Server running at {}", server.url());

    if !args.no_open {
        if let Err(e) = open::that(server.url()) {
            warn!("Failed to open browser: {}", e);
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
    }
    info!("Shutting down...");
    server.stop().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("md-open").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn defaults() {
        let args = parse(&["test.md"]);
        assert_eq!(args.files, [PathBuf::from("test.md")]);
        assert_eq!(args.port, 3000);
        assert!(!args.no_open);
        assert_eq!(args.tmux_pane, None);
        assert!(!args.use_claude_code);
    }

    #[test]
    fn port_short_and_long() {
        assert_eq!(parse(&["--port", "8080", "test.md"]).port, 8080);
        assert_eq!(parse(&["-p", "9000", "test.md"]).port, 9000);
    }

    #[test]
    fn combined_options_and_multiple_files() {
        let args = parse(&["-p", "4000", "--no-open", "a.md", "b.md", "c.md"]);
        assert_eq!(args.port, 4000);
        assert!(args.no_open);
        assert_eq!(args.files.len(), 3);
    }

    #[test]
    fn tmux_options() {
        let args = parse(&["--tmux-pane", "%3", "--use-claude-code", "a.md"]);
        assert_eq!(args.tmux_pane.as_deref(), Some("%3"));
        assert!(args.use_claude_code);
    }

    #[test]
    fn help_flags_exit_early() {
        for flag in ["-h", "--help"] {
            let err = Args::try_parse_from(["md-open", flag]).unwrap_err();
            assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
        }
    }

    #[test]
    fn version_flags() {
        assert!(parse(&["-v"]).version);
        assert!(parse(&["--version"]).version);
        assert!(!parse(&["a.md"]).version);
    }

    #[test]
    fn explicit_pane_wins_over_environment() {
        assert_eq!(
            resolve_pane(Some("%7".into()), true).as_deref(),
            Some("%7")
        );
        assert_eq!(resolve_pane(None, false), None);
    }

    #[test]
    fn missing_files_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("present.md");
        std::fs::write(&present, "# hi").unwrap();
        let kept = existing_files(vec![present.clone(), dir.path().join("absent.md")]);
        assert_eq!(kept, [present]);
    }
}

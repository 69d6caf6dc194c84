//! Embedscout CLI - resolves an episode page into playable streams.

use anyhow::{Context, Result};
use clap::Parser;
use embedscout::config::Config;
use embedscout::console::Console;
use embedscout::model::{StreamDescriptor, SubtitleTrack};
use embedscout::resolver::{HlsProbeDelegate, LinkResolver};
use embedscout::session::Session;
use embedscout::sink::ChannelSink;
use embedscout::PageFetcher;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

/// Resolves the video players embedded in an episode page.
#[derive(Parser, Debug)]
#[command(name = "embedscout")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// URL of the episode page.
    episode_url: String,

    /// Print one JSON object per stream instead of formatted lines.
    #[arg(long)]
    json: bool,

    /// Netscape cookie file to load before the first request.
    #[arg(long, value_name = "FILE")]
    cookies: Option<PathBuf>,

    /// Use this config file instead of the default location.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Number of embeds resolved at the same time.
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    concurrency: Option<u32>,

    /// Log resolver decisions to stderr.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    let console = Console::new();

    let mut config = match &args.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("Failed to load configuration")?;
    if let Some(concurrency) = args.concurrency {
        config.resolver.concurrency = concurrency as usize;
    }
    config.validate().context("Invalid configuration")?;

    init_tracing(args.verbose || config.resolver.debug);

    if !args.json {
        console.section("Embedscout");
        console.step(&format!("Resolving {}", args.episode_url));
    }

    let session = Session::from_config(&config.http, config.cookies.scoping)
        .context("Failed to create HTTP client")?;
    import_cookies(&session, &args, &config, &console)?;

    let fetcher = PageFetcher::new(session.clone());
    let delegate = Arc::new(HlsProbeDelegate::new(session));
    let resolver = LinkResolver::new(fetcher, delegate, &config);

    let (stream_tx, mut stream_rx) = mpsc::unbounded_channel::<StreamDescriptor>();
    let (subtitle_tx, mut subtitle_rx) = mpsc::unbounded_channel::<SubtitleTrack>();

    let resolve = async {
        let streams = ChannelSink(stream_tx);
        let subtitles = ChannelSink(subtitle_tx);
        resolver
            .resolve_links(&args.episode_url, &subtitles, &streams)
            .await
    };

    let print = async {
        let mut count = 0usize;
        let mut streams_open = true;
        let mut subtitles_open = true;
        while streams_open || subtitles_open {
            tokio::select! {
                stream = stream_rx.recv(), if streams_open => match stream {
                    Some(stream) => {
                        count += 1;
                        print_stream(&console, &stream, args.json)?;
                    }
                    None => streams_open = false,
                },
                track = subtitle_rx.recv(), if subtitles_open => match track {
                    Some(track) if !args.json => console.subtitle(&track),
                    Some(_) => {}
                    None => subtitles_open = false,
                },
            }
        }
        Ok::<usize, anyhow::Error>(count)
    };

    let (resolved, printed) = tokio::join!(resolve, print);
    let printed = printed?;

    match resolved {
        Ok(found) => {
            match summary(found, printed, args.json) {
                Some(Summary::Found(count)) => {
                    console.success(&format!("Found {} stream(s)", console.count(count)))
                }
                Some(Summary::Nothing) => console.warning("No playable streams found"),
                None => {}
            }
            Ok(if found { ExitCode::SUCCESS } else { ExitCode::FAILURE })
        }
        Err(e) => {
            console.error(&format!("{:#}", anyhow::Error::new(e)));
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Closing line of a run.
#[derive(Debug, PartialEq, Eq)]
enum Summary {
    Found(usize),
    Nothing,
}

/// JSON output carries stream objects only, so it gets no summary.
fn summary(found: bool, printed: usize, json: bool) -> Option<Summary> {
    match (json, found) {
        (true, _) => None,
        (false, true) => Some(Summary::Found(printed)),
        (false, false) => Some(Summary::Nothing),
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "embedscout=debug" } else { "embedscout=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Loads cookies from `--cookies`, else from the config directory when import
/// tokens are configured.
fn import_cookies(session: &Session, args: &Args, config: &Config, console: &Console) -> Result<()> {
    if let Some(path) = &args.cookies {
        let count = session
            .jar()
            .import_netscape_file(path)
            .with_context(|| format!("Failed to import cookies from {}", path.display()))?;
        if !args.json {
            console.info(&format!("Imported {} cookie(s) from {}", count, path.display()));
        }
        return Ok(());
    }

    if config.cookies.import_tokens.is_empty() {
        return Ok(());
    }
    let tokens: Vec<&str> = config.cookies.import_tokens.iter().map(String::as_str).collect();
    let dir = Config::config_dir()?;
    let imported = session
        .jar()
        .import_netscape_from_dir(&dir, &tokens)
        .context("Failed to import cookies from config directory")?;
    match imported {
        Some(path) if !args.json => console.info(&format!("Imported cookies from {}", path.display())),
        Some(_) => {}
        None => tracing::debug!(dir = %dir.display(), "no cookie file matched import tokens"),
    }
    Ok(())
}

fn print_stream(console: &Console, stream: &StreamDescriptor, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(stream)?);
    } else {
        console.stream(stream);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_silent_in_json_mode() {
        assert_eq!(summary(false, 0, true), None);
        assert_eq!(summary(true, 3, true), None);
    }

    #[test]
    fn test_summary_in_text_mode() {
        assert_eq!(summary(true, 3, false), Some(Summary::Found(3)));
        assert_eq!(summary(false, 0, false), Some(Summary::Nothing));
    }

    #[test]
    fn test_args_parse() {
        let args = Args::parse_from(["embedscout", "https://site.example/ep/1", "--json", "--concurrency", "2"]);
        assert!(args.json);
        assert_eq!(args.concurrency, Some(2));
        assert!(Args::try_parse_from(["embedscout", "https://site.example/ep/1", "--concurrency", "0"]).is_err());
    }
}

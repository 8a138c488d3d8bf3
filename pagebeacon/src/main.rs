//! pagebeacon - command line driver for the page beacon
//!
//! Sends page views, custom events and identify reports the way the
//! instrumented page would, or replays a scripted browsing session through
//! the watchers.
//!
//! Uses XDG Base Directory specification for file locations:
//! - Config: $XDG_CONFIG_HOME/pagebeacon/config.toml (~/.config/pagebeacon/config.toml)
//! - Visitor cookie: $XDG_DATA_HOME/pagebeacon/cookies.json
//! - Logs: $XDG_STATE_HOME/pagebeacon/pagebeacon.log (with --verbose)

mod replay;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use pagebeacon_core::identity::FileCookieJar;
use pagebeacon_core::transport::{HttpTransport, RecordingTransport, Transport};
use pagebeacon_core::{Ack, Config, PageEnvironment, Services, Tracker};
use serde_json::{json, Map, Value};
use url::Url;

#[derive(Parser)]
#[command(name = "pagebeacon")]
#[command(about = "Send page-view and interaction beacons")]
#[command(version)]
struct Args {
    /// Config file (default: $XDG_CONFIG_HOME/pagebeacon/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Write a debug log file
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print requests as JSON instead of sending them
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show resolved configuration and endpoint
    Status,

    /// Report a page view
    Pageview {
        #[command(flatten)]
        page: PageArgs,
    },

    /// Report a named custom event
    Event {
        /// Event name
        name: String,

        /// Event data as key=value (repeatable)
        #[arg(short, long = "data", value_name = "KEY=VALUE")]
        data: Vec<String>,

        #[command(flatten)]
        page: PageArgs,
    },

    /// Attach visitor data to the current page
    Identify {
        /// Visitor data as key=value (repeatable)
        #[arg(short, long = "data", value_name = "KEY=VALUE", required = true)]
        data: Vec<String>,

        #[command(flatten)]
        page: PageArgs,
    },

    /// Replay a JSON list of navigate/title/event steps
    Replay {
        /// Steps file
        file: PathBuf,

        #[command(flatten)]
        page: PageArgs,
    },
}

/// The page the beacon pretends to run on
#[derive(ClapArgs, Clone)]
struct PageArgs {
    /// Page url
    #[arg(long, default_value = "http://localhost/")]
    url: String,

    /// Document title
    #[arg(long)]
    title: Option<String>,

    /// Referring url
    #[arg(long, default_value = "")]
    referrer: String,

    /// Screen size as WIDTHxHEIGHT
    #[arg(long, default_value = "1920x1080")]
    screen: String,

    /// Browser language
    #[arg(long, default_value = "en-US")]
    language: String,
}

impl PageArgs {
    fn environment(&self) -> Result<PageEnvironment> {
        let (width, height) = self
            .screen
            .split_once('x')
            .and_then(|(w, h)| Some((w.parse().ok()?, h.parse().ok()?)))
            .with_context(|| format!("invalid screen size: {}", self.screen))?;

        Ok(PageEnvironment {
            href: self.url.clone(),
            hostname: hostname_of(&self.url)
                .with_context(|| format!("not an absolute url: {}", self.url))?,
            referrer: self.referrer.clone(),
            title: self.title.clone(),
            screen_width: width,
            screen_height: height,
            language: self.language.clone(),
        })
    }
}

/// Host part of an absolute url, the way `location.hostname` reports it
fn hostname_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    parsed
        .host_str()
        .filter(|host| !host.is_empty())
        .map(str::to_string)
}

/// Collect repeated `key=value` flags into a JSON object
fn parse_data(pairs: &[String]) -> Result<Value> {
    let mut data = Map::new();
    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("expected key=value, got '{}'", pair);
        };
        data.insert(key.to_string(), Value::String(value.to_string()));
    }
    Ok(Value::Object(data))
}

/// Everything a command needs to report
struct Session {
    tracker: Tracker,
    recording: Option<Arc<RecordingTransport>>,
    endpoint: Option<String>,
}

impl Session {
    fn open(config: &Config, env: &PageEnvironment, dry_run: bool) -> Result<Self> {
        let endpoint = config.tracker.endpoint().ok();

        let (transport, recording): (Arc<dyn Transport>, _) = if dry_run {
            let recording = Arc::new(RecordingTransport::new());
            (recording.clone(), Some(recording))
        } else {
            config
                .tracker
                .validate()
                .context("tracker is not configured (run 'status' for details)")?;
            let endpoint = config.tracker.endpoint()?;
            (Arc::new(HttpTransport::new(&endpoint)?), None)
        };

        let cookie_path = Config::cookie_jar_path();
        let cookies = FileCookieJar::open(&cookie_path)
            .with_context(|| format!("failed to open cookie jar {}", cookie_path.display()))?;

        let tracker = Tracker::new(
            &config.tracker,
            env,
            Services {
                transport,
                cookies: Arc::new(cookies),
                storage: None,
            },
        );

        Ok(Self {
            tracker,
            recording,
            endpoint,
        })
    }

    /// Print what was recorded in dry-run mode, one JSON object per line.
    fn print_recorded(&self) -> Result<()> {
        let Some(recording) = &self.recording else {
            return Ok(());
        };
        for request in recording.requests() {
            let line = json!({
                "endpoint": self.endpoint,
                "cache_token": request.cache_token,
                "body": request.body(),
            });
            println!("{}", serde_json::to_string(&line)?);
        }
        Ok(())
    }

    fn summarize(&self, ack: Option<Ack>) {
        if self.recording.is_some() {
            return;
        }
        match ack {
            Some(Ack::Delivered { .. }) => {
                println!("Report sent to {}", self.endpoint.as_deref().unwrap_or("?"))
            }
            Some(Ack::Suppressed) => println!("Tracking is disabled for this page; nothing sent"),
            None => println!("Report failed (run with --verbose for details)"),
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_from(path).context("failed to load configuration")?,
        None => Config::load().context("failed to load configuration")?,
    };

    let _log_guard = if args.verbose {
        Some(pagebeacon_core::logging::init(&config.logging).context("failed to initialize logging")?)
    } else {
        None
    };

    tracing::debug!(dry_run = args.dry_run, "pagebeacon starting");

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    runtime.block_on(async {
        match args.command {
            Command::Status => cmd_status(&config, args.config.as_ref()),
            Command::Pageview { page } => cmd_pageview(&config, &page, args.dry_run).await,
            Command::Event { name, data, page } => {
                cmd_event(&config, &page, &name, &data, args.dry_run).await
            }
            Command::Identify { data, page } => {
                cmd_identify(&config, &page, &data, args.dry_run).await
            }
            Command::Replay { file, page } => cmd_replay(&config, &page, &file, args.dry_run).await,
        }
    })
}

fn cmd_status(config: &Config, config_override: Option<&PathBuf>) -> Result<()> {
    let tracker = &config.tracker;
    let config_path = config_override.cloned().unwrap_or_else(Config::config_path);

    println!("Pagebeacon Configuration");
    println!("========================");
    println!();
    println!("Config File:     {}", config_path.display());
    println!(
        "Website ID:      {}",
        tracker.website_id.as_deref().unwrap_or("(not set)")
    );
    match tracker.endpoint() {
        Ok(endpoint) => println!("Endpoint:        {}", endpoint),
        Err(_) => println!("Endpoint:        (not set)"),
    }
    println!("Tag:             {}", tracker.tag.as_deref().unwrap_or("(none)"));
    println!("Auto Track:      {}", tracker.auto_track);
    println!("Exclude Search:  {}", tracker.exclude_search);
    if tracker.domains.is_empty() {
        println!("Domains:         (any)");
    } else {
        println!("Domains:         {}", tracker.domains.join(", "));
    }
    println!("Cookie Jar:      {}", Config::cookie_jar_path().display());
    println!("Log File:        {}", Config::log_path().display());

    println!();
    match tracker.validate() {
        Ok(()) => println!("Status: Ready to send"),
        Err(e) => println!("Status: Not ready ({})", e),
    }

    Ok(())
}

async fn cmd_pageview(config: &Config, page: &PageArgs, dry_run: bool) -> Result<()> {
    let env = page.environment()?;
    let session = Session::open(config, &env, dry_run)?;
    session.tracker.identity().ensure_identity();

    let ack = session.tracker.track_page_view().await;

    session.print_recorded()?;
    session.summarize(ack);
    Ok(())
}

async fn cmd_event(
    config: &Config,
    page: &PageArgs,
    name: &str,
    data: &[String],
    dry_run: bool,
) -> Result<()> {
    let env = page.environment()?;
    let data = if data.is_empty() {
        None
    } else {
        Some(parse_data(data)?)
    };
    let session = Session::open(config, &env, dry_run)?;
    session.tracker.identity().ensure_identity();

    let ack = session.tracker.track_event(name, data).await;

    session.print_recorded()?;
    session.summarize(ack);
    Ok(())
}

async fn cmd_identify(config: &Config, page: &PageArgs, data: &[String], dry_run: bool) -> Result<()> {
    let env = page.environment()?;
    let data = parse_data(data)?;
    let session = Session::open(config, &env, dry_run)?;
    session.tracker.identity().ensure_identity();

    let ack = session.tracker.identify(data).await;

    session.print_recorded()?;
    session.summarize(ack);
    Ok(())
}

async fn cmd_replay(
    config: &Config,
    page: &PageArgs,
    file: &PathBuf,
    dry_run: bool,
) -> Result<()> {
    let steps = replay::load_steps(file)?;
    let env = page.environment()?;
    let session = Session::open(config, &env, dry_run)?;

    let summary = replay::run(session.tracker.clone(), &env, &steps).await?;

    session.print_recorded()?;
    if session.recording.is_none() {
        println!();
        println!("Replay complete:");
        println!("  Steps:        {}", steps.len());
        println!("  Navigations:  {}", summary.navigations);
        println!("  Events:       {}", summary.events);
        println!("  Final URL:    {}", summary.final_url);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hostname_of() {
        assert_eq!(hostname_of("https://Shop.Example.com/a?b").as_deref(), Some("shop.example.com"));
        assert_eq!(hostname_of("http://user@host:8080/").as_deref(), Some("host"));
        assert_eq!(hostname_of("http://[::1]:3000/").as_deref(), Some("[::1]"));
        assert_eq!(hostname_of("https:shop.example.com/x").as_deref(), Some("shop.example.com"));
        assert_eq!(hostname_of("https://exa mple.com/"), None);
        assert_eq!(hostname_of("/relative"), None);
        assert_eq!(hostname_of("file:///tmp/x"), None);
    }

    #[test]
    fn test_parse_data() {
        let data = parse_data(&["plan=pro".to_string(), "seats=a=b".to_string()]).unwrap();
        assert_eq!(data, json!({"plan": "pro", "seats": "a=b"}));
        assert!(parse_data(&["oops".to_string()]).is_err());
    }

    #[test]
    fn test_page_environment() {
        let page = PageArgs {
            url: "https://example.com/docs".to_string(),
            title: Some("Docs".to_string()),
            referrer: String::new(),
            screen: "1280x720".to_string(),
            language: "de-DE".to_string(),
        };
        let env = page.environment().unwrap();
        assert_eq!(env.hostname, "example.com");
        assert_eq!(env.screen(), "1280x720");

        let bad = PageArgs {
            screen: "wide".to_string(),
            ..page
        };
        assert!(bad.environment().is_err());
    }
}

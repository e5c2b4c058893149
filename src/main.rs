use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;
use shiftmatch::config::{Config, ConfigOverrides};
use shiftmatch::digest::{run_once, run_schedule, DigestReport};
use shiftmatch::mock::{generate_mock_shifts, resolve_seed};
use shiftmatch::output::csv::{scored_to_csv, shifts_to_csv};
use shiftmatch::output::json::{render_json, render_scored_json};
use shiftmatch::output::table::{
    render_digest_report_table, render_scored_table, render_shifts_table,
    render_subscribers_table,
};
use shiftmatch::portal::PortalClient;
use shiftmatch::preferences::Preferences;
use shiftmatch::scoring::{ScoredShift, ShiftMatcher};
use shiftmatch::server::run_server;
use shiftmatch::shift::Shift;
use shiftmatch::subscribers::{Subscriber, SubscriberStore};
use shiftmatch::sync::{
    HttpScorer, LocalScorer, PreferenceSyncClient, ResultSet, ScoreResponse, Scorer, SyncPhase,
};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const PHASE_POLL: Duration = Duration::from_millis(25);

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
    Csv,
}

#[derive(Debug, Parser)]
#[command(
    name = "shiftmatch",
    about = "Match food coop work shifts to your preferences"
)]
struct Cli {
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,
    #[arg(long)]
    db: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the HTTP API.
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Log into the member portal and print the parsed shift calendar.
    Crawl {
        member: String,
        password: String,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Score generated sample shifts against the configured preferences.
    Mock {
        #[arg(long)]
        count: Option<usize>,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Rank a JSON file of shifts (an array, or an object with `shifts`).
    Score {
        #[arg(long)]
        input: PathBuf,
    },
    /// Re-score a saved result set with the configured preferences via the sync client.
    Rescore {
        #[arg(long)]
        input: PathBuf,
        #[arg(long = "scorer-url")]
        scorer_url: Option<String>,
        /// Score in-process instead of calling the scorer endpoint.
        #[arg(long)]
        local: bool,
    },
    /// Send the daily digest to every subscriber.
    Notify {
        #[arg(long)]
        now: bool,
    },
    /// List digest subscribers, or remove one.
    Subscribers {
        #[arg(long)]
        remove: Option<String>,
    },
    Config {
        #[arg(long)]
        init: bool,
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("shiftmatch=info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    if let Commands::Config { init, show } = &cli.command {
        return handle_config_command(*init, *show, &config_path);
    }

    let mut config = Config::load(Some(&config_path))?;
    let (host, port, scorer_url) = match &cli.command {
        Commands::Serve { host, port } => (host.clone(), *port, None),
        Commands::Rescore { scorer_url, .. } => (None, None, scorer_url.clone()),
        _ => (None, None, None),
    };
    config.apply_overrides(ConfigOverrides {
        host,
        port,
        scorer_url,
        db_path: cli.db.clone(),
    });

    match &cli.command {
        Commands::Serve { .. } => {
            let bind = format!("{}:{}", config.server.host, config.server.port);
            let addr: SocketAddr = bind
                .parse()
                .map_err(|e| anyhow!("invalid bind address {bind}: {e}"))?;
            run_server(config, addr).await?;
        }
        Commands::Crawl {
            member,
            password,
            limit,
        } => {
            let portal = PortalClient::new(&config.portal)?;
            let login = portal.login(member, password).await;
            info!("{}", login.message);
            if !login.success {
                for line in &login.debug {
                    warn!("{line}");
                }
                bail!("portal login failed: {}", login.message);
            }
            let page = portal.fetch_shifts().await;
            if !page.success {
                bail!("could not fetch shifts: {}", page.message);
            }
            info!("found {} shifts", page.shifts.len());
            let shown = limit.map_or(page.shifts.len(), |n| n.min(page.shifts.len()));
            print_shifts(&page.shifts[..shown], cli.output)?;
        }
        Commands::Mock { count, seed } => {
            let count = count.unwrap_or(config.mock.count);
            let seed = seed.unwrap_or_else(|| resolve_seed(&config.mock));
            let shifts = generate_mock_shifts(count, seed);
            let scored = matcher(&config.preferences)?.rank(&shifts);
            print_scored(&scored, cli.output)?;
        }
        Commands::Score { input } => {
            let shifts = read_shifts(input)?;
            let scored = matcher(&config.preferences)?.rank(&shifts);
            print_scored(&scored, cli.output)?;
        }
        Commands::Rescore { input, local, .. } => {
            let seed = read_scored(input)?;
            let rescored = if *local {
                rescore(LocalScorer, seed, &config).await?
            } else {
                let scorer =
                    HttpScorer::new(config.sync.scorer_url.clone(), config.sync.request_timeout())?;
                rescore(scorer, seed, &config).await?
            };
            print_scored(&rescored, cli.output)?;
        }
        Commands::Notify { now } => {
            if *now {
                let report = run_once(&config).await?;
                print_digest_report(&report, cli.output)?;
            } else {
                run_schedule(&config).await?;
            }
        }
        Commands::Subscribers { remove } => {
            let store = SubscriberStore::open(&config.resolved_db_path())?;
            if let Some(email) = remove {
                if store.remove(email)? {
                    info!("removed subscriber {email}");
                } else {
                    warn!("no subscriber with email {email}");
                }
            }
            print_subscribers(&store.list()?, cli.output)?;
        }
        Commands::Config { .. } => unreachable!("config command handled before dispatch"),
    }

    Ok(())
}

fn handle_config_command(init: bool, show: bool, config_path: &Path) -> Result<()> {
    if init {
        Config::write_template(config_path)?;
        println!("Wrote config template to {}", config_path.display());
    }
    if show || !init {
        let config = Config::load(Some(config_path))?;
        println!("{}", render_json(&config)?);
    }
    Ok(())
}

fn matcher(preferences: &Preferences) -> Result<ShiftMatcher> {
    preferences
        .validate()
        .context("invalid [preferences] in config")?;
    Ok(ShiftMatcher::new(preferences))
}

/// Seeds a sync client with `seed`, applies the configured preferences as one
/// change and waits for the debounced request to land or fail.
async fn rescore<S: Scorer + 'static>(
    scorer: S,
    seed: Vec<ScoredShift>,
    config: &Config,
) -> Result<Vec<ScoredShift>> {
    let (preferences, receiver) = watch::channel(Preferences::default());
    let mut client = PreferenceSyncClient::new(scorer, receiver, config.sync.debounce());
    client.replace_results(seed);
    let mut rendered = client.subscribe();

    preferences.send_replace(config.preferences.clone());
    client.on_preferences_changed();

    let results = wait_for_rescore(&client, &mut rendered).await?;
    Ok(results.as_ref().clone())
}

async fn wait_for_rescore<S: Scorer + 'static>(
    client: &PreferenceSyncClient<S>,
    rendered: &mut watch::Receiver<ResultSet>,
) -> Result<ResultSet> {
    loop {
        // The worker publishes before it leaves the in-flight count, so an
        // Idle phase read first means any result is already visible.
        let phase = client.phase();
        if rendered.has_changed()? {
            return Ok(rendered.borrow_and_update().clone());
        }
        if phase == SyncPhase::Idle {
            bail!("re-score failed; the result set was left unchanged (run with RUST_LOG=shiftmatch=debug for details)");
        }
        tokio::time::sleep(PHASE_POLL).await;
    }
}

fn read_shifts(path: &Path) -> Result<Vec<Shift>> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("failed reading shifts file: {}", path.display()))?;
    let value: Value = serde_json::from_str(&data)
        .with_context(|| format!("invalid JSON in {}", path.display()))?;
    let list = match value {
        Value::Array(items) => items,
        Value::Object(mut object) => match object.remove("shifts") {
            Some(Value::Array(items)) => items,
            _ => bail!("{} has no `shifts` array", path.display()),
        },
        _ => bail!("{} must hold an array of shifts", path.display()),
    };
    Ok(list.into_iter().map(Shift::from).collect())
}

fn read_scored(path: &Path) -> Result<Vec<ScoredShift>> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("failed reading result set: {}", path.display()))?;
    let response: ScoreResponse = serde_json::from_str(&data)
        .with_context(|| format!("{} is not a scored_shifts document", path.display()))?;
    if response.scored_shifts.is_empty() {
        bail!("{} holds no scored shifts; nothing to re-score", path.display());
    }
    Ok(response.scored_shifts)
}

fn print_scored(scored: &[ScoredShift], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => println!("{}", render_scored_table(scored)),
        OutputFormat::Json => println!("{}", render_scored_json(scored)?),
        OutputFormat::Csv => print!("{}", scored_to_csv(scored)?),
    }
    Ok(())
}

fn print_shifts(shifts: &[Shift], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => println!("{}", render_shifts_table(shifts)),
        OutputFormat::Json => println!("{}", render_json(shifts)?),
        OutputFormat::Csv => print!("{}", shifts_to_csv(shifts)?),
    }
    Ok(())
}

fn print_subscribers(subscribers: &[Subscriber], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => println!("{}", render_subscribers_table(subscribers)),
        OutputFormat::Json => println!("{}", render_json(subscribers)?),
        OutputFormat::Csv => {
            warn!("CSV output for subscribers not implemented, using JSON");
            println!("{}", render_json(subscribers)?);
        }
    }
    Ok(())
}

fn print_digest_report(report: &DigestReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => println!("{}", render_digest_report_table(report)),
        OutputFormat::Json | OutputFormat::Csv => println!("{}", render_json(report)?),
    }
    Ok(())
}

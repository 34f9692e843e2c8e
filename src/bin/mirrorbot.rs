//! mirrorbot daemon: mirrors polls and reminders from the cluster store and
//! delivers them to Discord when they expire.
//!
//! Usage: `mirrorbot [run|check-config|init-config] [--config <path>]`

use anyhow::Context;
use mirrorbot::delivery::DiscordDelivery;
use mirrorbot::store::ConfigMapStore;
use mirrorbot::{BotConfig, ExpiryScheduler, Mirror};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

enum Command {
    Run,
    CheckConfig,
    InitConfig,
}

struct Args {
    command: Command,
    config_path: Option<PathBuf>,
}

fn parse_args(args: &[String]) -> anyhow::Result<Args> {
    let mut command = Command::Run;
    let mut config_path = None;
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "run" => command = Command::Run,
            "check-config" => command = Command::CheckConfig,
            "init-config" => command = Command::InitConfig,
            "--config" | "-c" => {
                let path = iter.next().context("--config requires a path")?;
                config_path = Some(PathBuf::from(path));
            }
            other => anyhow::bail!("unknown argument `{other}` (use run|check-config|init-config)"),
        }
    }
    Ok(Args {
        command,
        config_path,
    })
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<BotConfig> {
    let mut config = match path {
        Some(path) => BotConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => {
            let default_path = BotConfig::default_config_path();
            if default_path.exists() {
                BotConfig::from_file(&default_path)
                    .with_context(|| format!("loading {}", default_path.display()))?
            } else {
                BotConfig::default()
            }
        }
    };
    config.apply_env_overrides();
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let argv: Vec<String> = std::env::args().skip(1).collect();
    let args = parse_args(&argv)?;

    match args.command {
        Command::InitConfig => {
            let path = args
                .config_path
                .unwrap_or_else(BotConfig::default_config_path);
            BotConfig::default().save_to_file(&path)?;
            println!("wrote default configuration to {}", path.display());
            Ok(())
        }
        Command::CheckConfig => {
            let config = load_config(args.config_path.as_ref())?;
            let problems = config.validate();
            if problems.is_empty() {
                println!("configuration ok");
                return Ok(());
            }
            for problem in &problems {
                println!("- {problem}");
            }
            anyhow::bail!("{} configuration problem(s)", problems.len())
        }
        Command::Run => {
            let config = load_config(args.config_path.as_ref())?;
            run(config).await
        }
    }
}

async fn run(config: BotConfig) -> anyhow::Result<()> {
    let problems = config.validate();
    if !problems.is_empty() {
        for problem in &problems {
            warn!("{problem}");
        }
        anyhow::bail!("invalid configuration");
    }

    let store = ConfigMapStore::from_config(&config.store).context("building store client")?;
    let delivery = DiscordDelivery::new(&config.discord);
    let mirror = Arc::new(Mirror::new(Arc::new(store)));
    let cancel = CancellationToken::new();

    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received Ctrl+C, shutting down...");
            cancel_clone.cancel();
        }
    });

    info!(
        version = env!("CARGO_PKG_VERSION"),
        namespace = %config.store.namespace,
        "mirrorbot starting"
    );

    let watch = mirror.spawn_watch(cancel.clone());
    let scheduler = ExpiryScheduler::new(mirror, Arc::new(delivery))
        .with_tick_interval(Duration::from_secs(config.scheduler.tick_interval_secs))
        .spawn(cancel.clone());

    let (watch_result, scheduler_result) = tokio::join!(watch, scheduler);
    watch_result.context("mirror watch task panicked")?;
    scheduler_result.context("scheduler task panicked")?;
    info!("mirrorbot stopped");
    Ok(())
}

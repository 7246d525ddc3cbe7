use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use mail_relay::auth::credentials::CredentialStore;
use mail_relay::auth::token_manager::{TokenManager, authorize, authorize_interactively};
use mail_relay::chat::discord::DiscordClient;
use mail_relay::config::{
    AuthConfig, default_config_path, load_auth_config, load_config, write_template,
};
use mail_relay::daemon::{DaemonConfig, poll_once, run_daemon, shutdown_channel};
use mail_relay::mail::gmail::GmailClient;

#[derive(Parser)]
#[command(name = "mail_relay")]
#[command(about = "Relay unread mail from one sender to a Discord channel", long_about = None)]
struct Cli {
    /// Config file (default: <config dir>/mail_relay/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Authorize, log in to Discord and relay mail until Ctrl-C
    Run {
        /// Seconds between polls (overrides config)
        #[arg(long)]
        interval: Option<u64>,

        /// Messages handled per poll (overrides config)
        #[arg(long)]
        max_results: Option<u32>,

        /// Poll once and exit
        #[arg(long)]
        once: bool,
    },

    /// Load the cached Gmail credential or run the browser flow to create one
    Auth,

    /// Write a template config file
    InitConfig,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    match cli.cmd {
        Command::InitConfig => {
            let path = match config_path {
                Some(p) => p.to_path_buf(),
                None => default_config_path()?,
            };
            write_template(&path)?;
            println!("Created template config at {}; edit it and run again", path.display());
            Ok(())
        }

        Command::Auth => {
            let auth = load_auth_config(config_path)?;
            let (store, _) = credential(&auth)?;
            println!("Gmail credential ready at {}", store.token_path().display());
            Ok(())
        }

        Command::Run {
            interval,
            max_results,
            once,
        } => run(config_path, interval, max_results, once),
    }
}

/// Cached credential, or the interactive flow when there is none.
fn credential(auth: &AuthConfig) -> Result<(CredentialStore, TokenManager)> {
    let store = CredentialStore::new(&auth.token_path, &auth.credentials_path);
    let (user, seeded) = authorize(&store, || {
        authorize_interactively(&store, auth.redirect_port)
    })?;

    let mut tokens = TokenManager::for_store(user, &store);
    if let Some(t) = seeded {
        tokens = tokens.with_tokens(&t);
    }
    Ok((store, tokens))
}

fn run(
    config_path: Option<&Path>,
    interval: Option<u64>,
    max_results: Option<u32>,
    once: bool,
) -> Result<()> {
    let cfg = load_config(config_path)
        .and_then(|cfg| cfg.with_overrides(interval, max_results))
        .map_err(|e| anyhow!("Configuration error: {e}"))?;

    let discord = DiscordClient::new(&cfg.bot_token, &cfg.channel_id);
    let me = discord.login()?;
    log::info!("Logged in as {} ({})", me.tag(), me.id);

    let (_, tokens) = credential(&cfg.auth)?;
    let gmail = GmailClient::new(Box::new(tokens));

    let daemon_cfg = DaemonConfig {
        sender: cfg.email_sender.clone(),
        interval: cfg.interval,
        max_results: cfg.max_results,
    };

    if once {
        let report = poll_once(&gmail, &discord, &daemon_cfg)?;
        log::info!(
            "Relayed {} message(s), {} delivery failure(s)",
            report.relayed,
            report.delivery_failures
        );
        return Ok(());
    }

    let (trigger, shutdown) = shutdown_channel();
    ctrlc::set_handler(move || trigger.trigger())?;

    run_daemon(&gmail, &discord, &daemon_cfg, &shutdown)
}

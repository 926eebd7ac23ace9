use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    follow_remote_changes, PhraseOptions, RemoteStore, SyncConfig, SyncCoordinator, SyncEvent,
    VocabularySession, WordForm,
};
use shared::{
    domain::{Category, Language, Number, Tense},
    protocol::database_name_for_username,
};
use storage::LocalStores;
use tokio::sync::{broadcast::error::RecvError, Mutex};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;

use config::{load_settings, read_saved_username, save_username, Settings};

#[derive(Parser, Debug)]
#[command(name = "trainer", about = "Sesotho / English vocabulary trainer")]
struct Cli {
    #[arg(long, global = true)]
    username: Option<String>,
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    #[arg(long, global = true)]
    remote_url: Option<String>,
    #[arg(long, global = true)]
    poll_interval_secs: Option<u64>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Remember the username whose vocabulary the other commands use.
    Use { username: String },
    /// Add a word; nouns and pronouns need plural forms, verbs need past forms.
    Add {
        kind: String,
        source: String,
        target: String,
        #[arg(long, default_value = "")]
        source_plural: String,
        #[arg(long, default_value = "")]
        target_plural: String,
        #[arg(long, default_value = "")]
        source_past: String,
        #[arg(long, default_value = "")]
        target_past: String,
    },
    List {
        #[arg(long)]
        kind: Option<Category>,
    },
    /// Build a phrase from random words; omitted options are picked at random.
    Generate {
        #[arg(long)]
        language: Option<Language>,
        #[arg(long)]
        tense: Option<Tense>,
        #[arg(long)]
        number: Option<Number>,
    },
    /// Replicate with the remote server until interrupted.
    Sync,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let cli = Cli::parse();
    let settings = resolve_settings(&cli);

    if let Command::Use { username } = &cli.command {
        if username.trim().is_empty() {
            bail!("username must not be blank");
        }
        save_username(&settings.data_dir, username)?;
        println!("using vocabulary of '{}'", username.trim());
        return Ok(());
    }

    let username = match settings.username.clone() {
        Some(username) => username,
        None => read_saved_username(&settings.data_dir)?
            .context("no username set: run `trainer use <username>` or pass --username")?,
    };
    let stores = LocalStores::in_dir(settings.data_dir.join("db"));
    let mut session = VocabularySession::new(Arc::new(stores));
    session.open(&username).await?;
    session.load().await?;

    match cli.command {
        Command::Use { .. } => {}
        Command::Add {
            kind,
            source,
            target,
            source_plural,
            target_plural,
            source_past,
            target_past,
        } => {
            let form = WordForm {
                kind,
                source,
                target,
                source_plural,
                target_plural,
                source_past,
                target_past,
            };
            let rev = session.add_word(&form).await?;
            println!("saved ({rev})");
        }
        Command::List { kind } => {
            let categories = match kind {
                Some(category) => vec![category],
                None => Category::ALL.to_vec(),
            };
            for category in categories {
                let entries = session.vocabulary().entries(category);
                if entries.is_empty() {
                    continue;
                }
                println!("{}:", category.collection_key());
                for entry in entries {
                    println!("  {}", entry.summary());
                }
            }
        }
        Command::Generate {
            language,
            tense,
            number,
        } => {
            let phrase = session.generate(PhraseOptions {
                language,
                tense,
                number,
            })?;
            println!("{phrase}");
            println!("({}, {}, {})", phrase.language, phrase.tense, phrase.number);
        }
        Command::Sync => run_sync(session, &username, &settings).await?,
    }

    Ok(())
}

fn resolve_settings(cli: &Cli) -> Settings {
    let mut settings = load_settings();
    if let Some(v) = &cli.data_dir {
        settings.data_dir = v.clone();
    }
    if let Some(v) = &cli.remote_url {
        settings.remote_url = Some(v.clone());
    }
    if let Some(v) = &cli.username {
        settings.username = Some(v.clone());
    }
    if let Some(secs) = cli.poll_interval_secs.filter(|secs| *secs > 0) {
        settings.poll_interval = Duration::from_secs(secs);
    }
    settings
}

async fn run_sync(session: VocabularySession, username: &str, settings: &Settings) -> Result<()> {
    let remote_url = settings
        .remote_url
        .as_deref()
        .context("no remote url: pass --remote-url or set TRAINER_REMOTE_URL")?;
    let remote = RemoteStore::new(remote_url, database_name_for_username(username))?;
    let local = session.store().context("session has no store")?;
    let session = Arc::new(Mutex::new(session));

    let mut coordinator = SyncCoordinator::new(
        local,
        Arc::new(remote),
        SyncConfig {
            poll_interval: settings.poll_interval,
            ..SyncConfig::default()
        },
    );
    let mut events = coordinator.subscribe();
    let follower = follow_remote_changes(Arc::clone(&session), coordinator.subscribe());
    coordinator.start();
    info!(username, remote_url, "sync started");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(SyncEvent::Active) => println!("sync: active"),
                Ok(SyncEvent::Changed { id, rev }) => println!("sync: pulled {id} at {rev}"),
                Ok(SyncEvent::Paused { reason }) => println!("sync: paused ({reason})"),
                Ok(SyncEvent::Error(message)) => eprintln!("sync: error: {message}"),
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            },
        }
    }

    follower.abort();
    let session = session.lock().await;
    println!(
        "stopped; {} words at revision {}",
        Category::ALL
            .iter()
            .map(|category| session.vocabulary().len(*category))
            .sum::<usize>(),
        session
            .revision()
            .map(ToString::to_string)
            .unwrap_or_else(|| "-".into())
    );
    Ok(())
}

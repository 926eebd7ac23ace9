use std::{collections::HashSet, sync::Arc, time::Duration};

use shared::protocol::{ChangeNotice, Revision, VOCAB_DOC_ID};
use storage::{DocumentStore, StoreError};
use tokio::{
    sync::{
        broadcast::{self, error::RecvError},
        Mutex,
    },
    task::JoinHandle,
};
use tokio_stream::{
    wrappers::{errors::BroadcastStreamRecvError, BroadcastStream},
    StreamExt,
};
use tracing::{debug, error, info, warn};

use crate::session::VocabularySession;

const SYNC_EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// Replication is running; sent once after start and after each recovery.
    Active,
    /// A remote change to `id` was applied to the local store.
    Changed { id: String, rev: Revision },
    /// The remote could not be reached; replication resumes on its own.
    Paused { reason: String },
    Error(String),
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub poll_interval: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
        }
    }
}

/// Continuous two-way replication between a local and a remote store.
///
/// Once started the background task lives as long as the runtime.
pub struct SyncCoordinator {
    local: Arc<dyn DocumentStore>,
    remote: Arc<dyn DocumentStore>,
    config: SyncConfig,
    events: broadcast::Sender<SyncEvent>,
    task: Option<JoinHandle<()>>,
}

impl SyncCoordinator {
    pub fn new(
        local: Arc<dyn DocumentStore>,
        remote: Arc<dyn DocumentStore>,
        config: SyncConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(SYNC_EVENT_CAPACITY);
        Self {
            local,
            remote,
            config,
            events,
            task: None,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    pub fn start(&mut self) {
        if self.task.is_some() {
            return;
        }
        info!(
            local = self.local.name(),
            remote = self.remote.name(),
            "starting replication"
        );
        let replicator = Replicator {
            local: Arc::clone(&self.local),
            remote: Arc::clone(&self.remote),
            config: self.config.clone(),
            events: self.events.clone(),
            pull_since: 0,
            push_since: 0,
            link: LinkState::Starting,
        };
        self.task = Some(tokio::spawn(replicator.run()));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkState {
    Starting,
    Active,
    Paused,
    Failing,
}

enum Wake {
    Timer,
    Notice,
    RemoteFeedClosed,
    LocalFeedClosed,
}

struct Replicator {
    local: Arc<dyn DocumentStore>,
    remote: Arc<dyn DocumentStore>,
    config: SyncConfig,
    events: broadcast::Sender<SyncEvent>,
    pull_since: i64,
    push_since: i64,
    link: LinkState,
}

impl Replicator {
    async fn run(mut self) {
        let mut local_feed = match self.local.watch().await {
            Ok(feed) => Some(feed),
            Err(err) => {
                warn!(%err, "local change feed unavailable; relying on polling");
                None
            }
        };
        let mut remote_feed: Option<broadcast::Receiver<ChangeNotice>> = None;
        let mut backoff = self.config.initial_backoff;

        loop {
            if remote_feed.is_none() {
                match self.remote.watch().await {
                    Ok(feed) => remote_feed = Some(feed),
                    Err(err) => debug!(%err, "remote change feed unavailable; polling"),
                }
            }

            let delay = match self.cycle().await {
                Ok(()) => {
                    self.transition(LinkState::Active, None);
                    backoff = self.config.initial_backoff;
                    self.config.poll_interval
                }
                Err(err) => {
                    if err.is_unavailable() {
                        self.transition(LinkState::Paused, Some(err.to_string()));
                    } else {
                        error!(%err, "replication cycle failed");
                        self.transition(LinkState::Failing, Some(err.to_string()));
                    }
                    let delay = backoff;
                    backoff = (backoff * 2).min(self.config.max_backoff);
                    delay
                }
            };

            let wake = tokio::select! {
                _ = tokio::time::sleep(delay) => Wake::Timer,
                result = next_notice(&mut remote_feed) => match result {
                    Err(RecvError::Closed) => Wake::RemoteFeedClosed,
                    _ => Wake::Notice,
                },
                result = next_notice(&mut local_feed) => match result {
                    Err(RecvError::Closed) => Wake::LocalFeedClosed,
                    _ => Wake::Notice,
                },
            };

            match wake {
                Wake::Timer | Wake::Notice => {}
                Wake::RemoteFeedClosed => {
                    debug!("remote change feed closed");
                    remote_feed = None;
                    tokio::time::sleep(self.config.initial_backoff).await;
                }
                Wake::LocalFeedClosed => local_feed = None,
            }
        }
    }

    fn transition(&mut self, next: LinkState, reason: Option<String>) {
        let reason = reason.unwrap_or_default();
        match next {
            LinkState::Active if self.link != LinkState::Active => {
                info!("replication active");
                let _ = self.events.send(SyncEvent::Active);
            }
            LinkState::Paused if self.link != LinkState::Paused => {
                warn!(%reason, "replication paused");
                let _ = self.events.send(SyncEvent::Paused { reason });
            }
            LinkState::Failing => {
                let _ = self.events.send(SyncEvent::Error(reason));
            }
            _ => {}
        }
        self.link = next;
    }

    async fn cycle(&mut self) -> Result<(), StoreError> {
        self.pull().await?;
        self.push().await
    }

    async fn pull(&mut self) -> Result<(), StoreError> {
        let changes = self.remote.changes_since(self.pull_since).await?;
        for id in distinct_ids(&changes.results) {
            let document = match self.remote.get(&id).await {
                Ok(document) => document,
                Err(err) if err.is_not_found() => continue,
                Err(err) => return Err(err),
            };
            if self.local.apply_replicated(&document).await? {
                info!(doc_id = %id, rev = %document.rev, "pulled remote change");
                let _ = self.events.send(SyncEvent::Changed {
                    id,
                    rev: document.rev,
                });
            }
        }
        self.pull_since = changes.last_seq;
        Ok(())
    }

    async fn push(&mut self) -> Result<(), StoreError> {
        let changes = self.local.changes_since(self.push_since).await?;
        for id in distinct_ids(&changes.results) {
            let document = match self.local.get(&id).await {
                Ok(document) => document,
                Err(err) if err.is_not_found() => continue,
                Err(err) => return Err(err),
            };
            if self.remote.apply_replicated(&document).await? {
                debug!(doc_id = %id, rev = %document.rev, "pushed local change");
            }
        }
        self.push_since = changes.last_seq;
        Ok(())
    }
}

fn distinct_ids(changes: &[shared::protocol::ChangeEntry]) -> Vec<String> {
    let mut seen = HashSet::new();
    changes
        .iter()
        .filter(|change| seen.insert(change.id.as_str()))
        .map(|change| change.id.clone())
        .collect()
}

async fn next_notice(
    feed: &mut Option<broadcast::Receiver<ChangeNotice>>,
) -> Result<ChangeNotice, RecvError> {
    match feed {
        Some(feed) => feed.recv().await,
        None => std::future::pending().await,
    }
}

/// Reloads `session` whenever replication brings in a remote change to the
/// vocabulary document. Unsaved in-memory edits are replaced by the reload.
pub fn follow_remote_changes(
    session: Arc<Mutex<VocabularySession>>,
    events: broadcast::Receiver<SyncEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut events = BroadcastStream::new(events);
        while let Some(event) = events.next().await {
            let reload = match event {
                Ok(SyncEvent::Changed { id, .. }) => id == VOCAB_DOC_ID,
                Ok(_) => false,
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!(skipped, "sync events lagged; reloading");
                    true
                }
            };
            if !reload {
                continue;
            }
            let mut session = session.lock().await;
            if let Err(err) = session.load().await {
                warn!(%err, "reload after remote change failed");
            }
        }
    })
}

#[cfg(test)]
#[path = "tests/sync_tests.rs"]
mod tests;

//! Executes operator commands against a [`ReqRespClient`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite};
use tracing::{debug, info, warn};

use super::background::BackgroundTask;
use super::command::{
    BlocksByRangeCommand, Command, CommandOutcome, StatusCommand, StatusView, WatchStatusCommand,
};
use super::stdio::write_outcome_to;
use crate::client::{RangeSyncOptions, ReqRespClient};
use crate::config::compression_by_name;
use crate::context::ExchangeContext;
use crate::error::{ReqRespError, Result};
use crate::methods::{BlocksByRangeRequest, Status};
use crate::sync::{BlockStore, ChainSink};
use crate::transport::{CapabilitySource, PeerId, StreamOpener};

type StatusTable = Arc<RwLock<HashMap<PeerId, Status>>>;

/// Owns the client, the block collaborators and the background watchers.
pub struct Controller<O, C> {
    client: Arc<ReqRespClient<O, C>>,
    store: Arc<dyn BlockStore>,
    chain: Arc<dyn ChainSink>,
    local_status: Status,
    latest_status: StatusTable,
    watchers: Mutex<HashMap<PeerId, BackgroundTask>>,
}

impl<O, C> Controller<O, C>
where
    O: StreamOpener + 'static,
    C: CapabilitySource + 'static,
{
    pub fn new(
        client: ReqRespClient<O, C>,
        store: Arc<dyn BlockStore>,
        chain: Arc<dyn ChainSink>,
    ) -> Self {
        Self {
            client: Arc::new(client),
            store,
            chain,
            local_status: Status::default(),
            latest_status: Arc::new(RwLock::new(HashMap::new())),
            watchers: Mutex::new(HashMap::new()),
        }
    }

    /// Status sent in every status exchange.
    pub fn with_local_status(mut self, status: Status) -> Self {
        self.local_status = status;
        self
    }

    pub fn client(&self) -> &ReqRespClient<O, C> {
        &self.client
    }

    /// Last status received from `peer`, by a command or a watcher.
    pub fn last_status(&self, peer: &PeerId) -> Option<Status> {
        self.latest_status.read().get(peer).copied()
    }

    /// Peers with a running watcher, sorted.
    pub fn watched_peers(&self) -> Vec<PeerId> {
        let mut peers: Vec<_> = self.watchers.lock().keys().cloned().collect();
        peers.sort();
        peers
    }

    /// Run one command.
    pub async fn execute(&self, command: Command) -> Result<CommandOutcome> {
        match command {
            Command::BlocksByRange(cmd) => self.blocks_by_range(cmd).await,
            Command::Status(cmd) => self.status(cmd).await,
            Command::WatchStatus(cmd) => self.watch_status(cmd),
            Command::Unwatch { peer } => {
                let task = self.watchers.lock().remove(&peer);
                let was_watching = task.is_some();
                if let Some(task) = task {
                    task.shutdown().await;
                }
                Ok(CommandOutcome::Unwatched { peer, was_watching })
            }
        }
    }

    /// Parse and run one JSON line. Every failure becomes a `failed` outcome.
    pub async fn execute_line(&self, line: &str) -> CommandOutcome {
        let command = match Command::from_json(line) {
            Ok(command) => command,
            Err(e) => return CommandOutcome::failed(&ReqRespError::Json(e)),
        };
        match self.execute(command).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, chunk_index = ?e.chunk_index(), "command failed");
                CommandOutcome::failed(&e)
            }
        }
    }

    /// Read commands line by line and answer each with one JSON line, until
    /// the input ends. Blank lines are skipped.
    pub async fn serve_lines<R, W>(&self, input: R, output: &mut W) -> Result<u64>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + ?Sized,
    {
        let mut lines = input.lines();
        let mut served = 0u64;
        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let outcome = self.execute_line(line).await;
            write_outcome_to(output, &outcome).await?;
            served += 1;
        }
        Ok(served)
    }

    /// Stop every watcher and wait for them.
    pub async fn shutdown(&self) {
        let tasks: Vec<_> = self.watchers.lock().drain().map(|(_, task)| task).collect();
        for task in tasks {
            task.shutdown().await;
        }
    }

    fn context(&self, timeout_ms: Option<u64>) -> ExchangeContext {
        match timeout_ms {
            None => self.client.context(),
            Some(0) => self.client.context_with_timeout(None),
            Some(ms) => self
                .client
                .context_with_timeout(Some(Duration::from_millis(ms))),
        }
    }

    async fn blocks_by_range(&self, cmd: BlocksByRangeCommand) -> Result<CommandOutcome> {
        let request = BlocksByRangeRequest::new(cmd.start_slot, cmd.count, cmd.step);
        let mut options = RangeSyncOptions::default();
        if let Some(name) = &cmd.compression {
            options = options.compression(compression_by_name(name)?);
        }
        if cmd.store {
            options = options.store(self.store.as_ref());
        }
        if cmd.process {
            options = options.chain(self.chain.as_ref());
        }

        let ctx = self.context(cmd.timeout_ms);
        let summary = self
            .client
            .blocks_by_range(&ctx, &cmd.peer, request, options)
            .await?;
        info!(peer = %cmd.peer, received = summary.received, "range sync complete");
        Ok(CommandOutcome::blocks_by_range(cmd.peer, summary))
    }

    async fn status(&self, cmd: StatusCommand) -> Result<CommandOutcome> {
        let compression = cmd.compression.as_deref().map(compression_by_name).transpose()?;
        let ctx = self.context(cmd.timeout_ms);
        let status = self
            .client
            .status(&ctx, &cmd.peer, &self.local_status, compression)
            .await?;
        self.latest_status.write().insert(cmd.peer.clone(), status);
        Ok(CommandOutcome::Status {
            peer: cmd.peer,
            status: StatusView::from(&status),
        })
    }

    fn watch_status(&self, cmd: WatchStatusCommand) -> Result<CommandOutcome> {
        if cmd.interval_ms == 0 {
            return Err(ReqRespError::InvalidRequest(
                "interval_ms must be > 0".into(),
            ));
        }
        let mut watchers = self.watchers.lock();
        if watchers.contains_key(&cmd.peer) {
            return Err(ReqRespError::InvalidRequest(format!(
                "already watching {}",
                cmd.peer
            )));
        }

        let client = self.client.clone();
        let table = self.latest_status.clone();
        let local = self.local_status;
        let peer = cmd.peer.clone();
        let interval = Duration::from_millis(cmd.interval_ms);
        let task = BackgroundTask::spawn(format!("watch-status-{}", peer), move |mut token| async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let ctx = client.context().with_cancellation(token.clone());
                match client.status(&ctx, &peer, &local, None).await {
                    Ok(status) => {
                        debug!(peer = %peer, head_slot = status.head_slot, "status refreshed");
                        table.write().insert(peer.clone(), status);
                    }
                    Err(ReqRespError::Cancelled) => break,
                    Err(e) => warn!(peer = %peer, error = %e, "status refresh failed"),
                }
            }
        });
        watchers.insert(cmd.peer.clone(), task);

        Ok(CommandOutcome::Watching {
            peer: cmd.peer,
            interval_ms: cmd.interval_ms,
        })
    }
}

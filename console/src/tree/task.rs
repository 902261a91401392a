use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{SnapshotSource, TreeSnapshotProjector, TreeView};
use crate::context::AppContext;

/// Consumer of projected tree views
pub trait TreeRenderer: Send {
    fn render(&mut self, view: &TreeView);
}

/// One unit of periodic work
#[async_trait]
pub trait Cycle: Send + 'static {
    async fn run(&mut self);
}

/// A self-rescheduling background loop.
///
/// Runs its cycle immediately, then waits `interval` after each cycle
/// completes before starting the next, so cycles never overlap and a slow
/// cycle simply delays the following one. Cancelled on
/// [`shutdown`](Self::shutdown) or drop.
pub struct ScheduledTask {
    name: &'static str,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl ScheduledTask {
    pub fn spawn(name: &'static str, interval: Duration, mut cycle: impl Cycle) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            tracing::debug!(task = name, ?interval, "Scheduled task started");
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = cycle.run() => {}
                }
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
            tracing::debug!(task = name, "Scheduled task stopped");
        });
        Self {
            name,
            cancel,
            handle: Some(handle),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Stop scheduling further cycles and wait for the loop to exit.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::warn!(task = self.name, error = %e, "Scheduled task ended abnormally");
            }
        }
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Fetch -> project -> render, once.
pub struct ProjectionCycle {
    ctx: Arc<AppContext>,
    projector: Arc<Mutex<TreeSnapshotProjector>>,
    source: Arc<dyn SnapshotSource>,
    renderer: Box<dyn TreeRenderer>,
}

impl ProjectionCycle {
    pub fn new(
        ctx: Arc<AppContext>,
        projector: Arc<Mutex<TreeSnapshotProjector>>,
        source: Arc<dyn SnapshotSource>,
        renderer: Box<dyn TreeRenderer>,
    ) -> Self {
        Self {
            ctx,
            projector,
            source,
            renderer,
        }
    }

    /// Run one cycle; returns the rendered view, or `None` when the
    /// fetch failed and rendering was skipped.
    pub async fn run_once(&mut self) -> Option<TreeView> {
        let mut snapshot = match self.source.fetch().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(error = %e, "Network tree fetch failed; skipping render");
                return None;
            }
        };
        if snapshot
            .iter()
            .any(|(_, node)| node.parents.is_empty() && node.immediate_parent.is_some())
        {
            tracing::debug!("Snapshot lacks parent chains; rebuilding from immediate parents");
            shared_types::rebuild_parent_chains(&mut snapshot);
        }

        let redact = self.ctx.redacted();
        let view = self.projector.lock().project(&snapshot, redact);
        self.renderer.render(&view);
        Some(view)
    }
}

#[async_trait]
impl Cycle for ProjectionCycle {
    async fn run(&mut self) {
        self.run_once().await;
    }
}

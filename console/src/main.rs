use std::sync::Arc;

use anyhow::Context;
use parking_lot::Mutex;
use shared_types::{
    QueueDropsSample, ThroughputSample, MSG_AUTH_OK, MSG_QUEUE_DROPS, MSG_THROUGHPUT,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use shaper_console::bus::{BusError, Delivery, MessageRouter, TelemetryBus};
use shaper_console::commands::{Command, HELP};
use shaper_console::config::Config;
use shaper_console::context::{AppContext, View};
use shaper_console::history::RollingSeries;
use shaper_console::render::{summarize_queue_drops, summarize_throughput, LogRenderer};
use shaper_console::store::{load_tree_depth, save_tree_depth, LocalStore};
use shaper_console::tree::{HttpSnapshotSource, ProjectionCycle, ScheduledTask, TreeSnapshotProjector};

/// Everything a stdin command can act on
struct Console {
    ctx: Arc<AppContext>,
    bus: TelemetryBus,
    projector: Arc<Mutex<TreeSnapshotProjector>>,
    throughput: RollingSeries<ThroughputSample>,
    queue_drops: RollingSeries<QueueDropsSample>,
}

impl Console {
    /// Apply one command; returns `false` on quit.
    fn dispatch(&mut self, command: Command) -> bool {
        let sent = match command {
            Command::ThroughputSite(id) => self.bus.request_throughput_chart_site(&id),
            Command::ThroughputCircuit(id) => self.bus.request_throughput_chart_circuit(&id),
            Command::RttSite(id) => self.bus.request_rtt_chart_site(&id),
            Command::RttCircuit(id) => self.bus.request_rtt_chart_circuit(&id),
            Command::SiteHeat(id) => self.bus.request_site_heat(&id),
            Command::Search(term) => self.bus.send_search(&term),
            Command::SiteInfo(id) => self.bus.request_site_info(&id),
            Command::CircuitInfo(id) => self.bus.request_circuit_info(&id),
            Command::SiteParents(id) => self.bus.request_site_parents(&id),
            Command::Quit => return false,
            other => {
                self.apply_local(other);
                return true;
            }
        };
        report_delivery(sent);
        true
    }

    fn apply_local(&mut self, command: Command) {
        match command {
            Command::Period(period) => {
                tracing::info!(period = %period, "Chart period changed");
                self.ctx.ui.write().graph_period = period;
            }
            Command::SelectRoot(name) => {
                if self.projector.lock().select_root_by_name(&name) {
                    tracing::info!(root = %name, "Tree root selected");
                } else {
                    tracing::warn!(name = %name, "No node by that name in the last snapshot");
                }
            }
            Command::ResetRoot => {
                self.projector.lock().reset_root();
                tracing::info!("Tree root reset");
            }
            Command::Depth(depth) => {
                self.projector.lock().set_max_depth(depth);
                if let Err(e) = save_tree_depth(&self.ctx.store, depth) {
                    tracing::warn!(error = %e, "Failed to persist tree depth");
                }
                tracing::info!(depth, "Tree depth changed");
            }
            Command::History => {
                tracing::info!("{}", summarize_throughput(&self.throughput.snapshot()));
                tracing::info!("{}", summarize_queue_drops(&self.queue_drops.snapshot()));
            }
            Command::Status => {
                let auth = self.ctx.auth.snapshot();
                let (root, depth) = {
                    let projector = self.projector.lock();
                    (projector.root_index(), projector.max_depth())
                };
                tracing::info!(
                    connected = self.bus.is_connected(),
                    queued = self.bus.queued_len(),
                    authenticated = auth.is_authenticated(),
                    user = auth.display_name.as_deref().unwrap_or("-"),
                    view = ?self.ctx.current_view(),
                    period = %self.ctx.graph_period(),
                    root,
                    depth,
                    "Status"
                );
            }
            Command::Logout => {
                if let Err(e) = self.ctx.auth.logout() {
                    tracing::warn!(error = %e, "Failed to clear stored token");
                }
                self.ctx.navigate(View::Login);
            }
            Command::Help => println!("{HELP}"),
            _ => {}
        }
    }
}

fn report_delivery(result: Result<Delivery, BusError>) {
    match result {
        Ok(Delivery::Sent) => tracing::debug!("Request sent"),
        Ok(Delivery::Queued) => tracing::info!("Not connected; request queued until the daemon is back"),
        Err(e) => tracing::warn!(error = %e, "Request failed"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shaper_console=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    tracing::info!(page = %config.page_url, state = %config.state_path.display(), "Starting shaper console");

    let store = Arc::new(
        LocalStore::open(config.state_path.clone())
            .with_context(|| format!("opening local state {}", config.state_path.display()))?,
    );
    let ctx = Arc::new(AppContext::new(store.clone(), config.ui_state()));

    // Rolling chart histories fed straight from the bus
    let throughput = RollingSeries::<ThroughputSample>::new(config.history_len)?;
    let queue_drops = RollingSeries::<QueueDropsSample>::new(config.history_len)?;

    let mut router = MessageRouter::new();
    router.subscribe(MSG_THROUGHPUT, throughput.clone());
    router.subscribe(MSG_QUEUE_DROPS, queue_drops.clone());
    router.subscribe_fn(MSG_AUTH_OK, |message| {
        let name = message.payload["name"].as_str().unwrap_or_default();
        tracing::info!(user = %name, "Session ready");
    });
    router.subscribe_all(|message| {
        tracing::trace!(kind = ?message.kind, "Inbound message");
    });

    let mut bus = TelemetryBus::new(ctx.clone(), router);
    let mut events = bus.connect(&config.page_url, config.retry_policy())?;
    let mut status = bus.connection_status();
    let mut view = ctx.subscribe_view();

    // Network tree
    let projector = Arc::new(Mutex::new(TreeSnapshotProjector::new(load_tree_depth(&store)?)));
    let source = Arc::new(HttpSnapshotSource::new(&config.page_url)?);
    tracing::info!(url = %source.url(), every = ?config.tree_poll_interval, "Polling network tree");
    let tree_task = ScheduledTask::spawn(
        "network-tree",
        config.tree_poll_interval,
        ProjectionCycle::new(ctx.clone(), projector.clone(), source, Box::new(LogRenderer::new())),
    );

    let mut console = Console {
        ctx: ctx.clone(),
        bus,
        projector,
        throughput,
        queue_drops,
    };

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut transport_running = true;
    tracing::info!("Type `help` for commands");

    loop {
        tokio::select! {
            event = events.recv(), if transport_running => match event {
                Some(event) => console.bus.handle_event(event),
                None => {
                    tracing::warn!("Connection task ended; requests will queue until restart");
                    transport_running = false;
                }
            },
            Ok(()) = status.changed() => {
                let connected = *status.borrow_and_update();
                tracing::debug!(connected, "Connection status changed");
            }
            Ok(()) = view.changed() => {
                if *view.borrow_and_update() == View::Login {
                    tracing::warn!("Not signed in; the daemon will not stream data until a valid token is stored");
                }
            }
            line = stdin.next_line(), if stdin_open => match line {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match line.parse::<Command>() {
                        Ok(command) => {
                            if !console.dispatch(command) {
                                break;
                            }
                        }
                        Err(e) => tracing::warn!(error = %e, "Type `help` for commands"),
                    }
                }
                Ok(None) => {
                    tracing::debug!("stdin closed; running until interrupted");
                    stdin_open = false;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to read stdin");
                    stdin_open = false;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
        }
    }

    tree_task.shutdown().await;
    console.bus.detach();
    tracing::info!("Shaper console stopped");
    Ok(())
}

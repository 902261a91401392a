//! Network tree polling against a local HTTP endpoint

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use parking_lot::Mutex;
use tokio::net::TcpListener;

use shaper_console::context::{AppContext, UiState};
use shaper_console::store::{load_tree_depth, LocalStore};
use shaper_console::tree::{
    HttpSnapshotSource, ProjectionCycle, ScheduledTask, SnapshotError, SnapshotSource, TreeRenderer,
    TreeSnapshotProjector, TreeView,
};
use shared_types::{
    rebuild_parent_chains, NetworkJsonTransport, NetworkTreeEntry, NETWORK_TREE_PATH,
};

#[derive(Default)]
struct DaemonState {
    failing: AtomicBool,
    hits: AtomicUsize,
}

struct TestServer {
    addr: SocketAddr,
    state: Arc<DaemonState>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    fn page_url(&self) -> String {
        format!("http://{}/index.html", self.addr)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn node(name: &str, immediate_parent: Option<usize>) -> NetworkJsonTransport {
    NetworkJsonTransport {
        name: name.to_string(),
        is_virtual: false,
        max_throughput: (1000, 1000),
        current_throughput: (62_500_000, 1_000),
        current_packets: (0, 0),
        current_retransmits: (0, 0),
        current_marks: (0, 0),
        current_drops: (0, 0),
        rtts: vec![12.0],
        parents: Vec::new(),
        immediate_parent,
        node_type: Some("site".to_string()),
    }
}

/// Root <- Region <- Tower 1, Root <- Tower 2
fn topology() -> Vec<NetworkTreeEntry> {
    let mut entries = vec![
        (0, node("Root", None)),
        (1, node("Region", Some(0))),
        (2, node("Tower 1", Some(1))),
        (3, node("Tower 2", Some(0))),
    ];
    rebuild_parent_chains(&mut entries);
    entries
}

async fn network_tree(
    State(state): State<Arc<DaemonState>>,
) -> Result<Json<Vec<NetworkTreeEntry>>, StatusCode> {
    state.hits.fetch_add(1, Ordering::SeqCst);
    if state.failing.load(Ordering::SeqCst) {
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }
    Ok(Json(topology()))
}

async fn start_test_server() -> TestServer {
    let state = Arc::new(DaemonState::default());
    let app = Router::new()
        .route(NETWORK_TREE_PATH, get(network_tree))
        .with_state(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind listener");
    let addr = listener.local_addr().expect("Failed to get addr");
    let handle = tokio::spawn(async move {
        axum::serve(listener, app.into_make_service())
            .await
            .expect("Server failed");
    });

    TestServer {
        addr,
        state,
        handle,
    }
}

#[derive(Clone, Default)]
struct RecordingRenderer {
    views: Arc<Mutex<Vec<TreeView>>>,
}

impl TreeRenderer for RecordingRenderer {
    fn render(&mut self, view: &TreeView) {
        self.views.lock().push(view.clone());
    }
}

struct Harness {
    ctx: Arc<AppContext>,
    projector: Arc<Mutex<TreeSnapshotProjector>>,
    renderer: RecordingRenderer,
    cycle: ProjectionCycle,
}

fn harness(server: &TestServer, depth: usize) -> Harness {
    let ctx = Arc::new(AppContext::new(
        Arc::new(LocalStore::in_memory()),
        UiState::default(),
    ));
    let projector = Arc::new(Mutex::new(TreeSnapshotProjector::new(depth)));
    let source = Arc::new(HttpSnapshotSource::new(&server.page_url()).unwrap());
    let renderer = RecordingRenderer::default();
    let cycle = ProjectionCycle::new(
        ctx.clone(),
        projector.clone(),
        source,
        Box::new(renderer.clone()),
    );
    Harness {
        ctx,
        projector,
        renderer,
        cycle,
    }
}

fn names(view: &TreeView) -> Vec<&str> {
    view.nodes.iter().map(|n| n.name.as_str()).collect()
}

#[tokio::test]
async fn test_fetch_decodes_snapshot() {
    let server = start_test_server().await;
    let source = HttpSnapshotSource::new(&server.page_url()).unwrap();

    let snapshot = source.fetch().await.unwrap();
    assert_eq!(snapshot.len(), 4);
    assert_eq!(snapshot[2].1.name, "Tower 1");
    assert_eq!(snapshot[2].1.parents, vec![0, 1]);
    assert_eq!(snapshot[2].1.rtts, vec![12.0]);
}

#[tokio::test]
async fn test_fetch_surfaces_http_errors() {
    let server = start_test_server().await;
    server.state.failing.store(true, Ordering::SeqCst);
    let source = HttpSnapshotSource::new(&server.page_url()).unwrap();

    let err = source.fetch().await.unwrap_err();
    assert!(matches!(err, SnapshotError::Http(_)));
}

#[tokio::test]
async fn test_cycle_projects_with_persisted_depth() {
    let server = start_test_server().await;
    let store = LocalStore::in_memory();
    let depth = load_tree_depth(&store).unwrap();
    let mut h = harness(&server, depth);

    let view = h.cycle.run_once().await.unwrap();
    assert_eq!(names(&view), vec!["Root", "Region", "Tower 1", "Tower 2"]);
    assert_eq!(view.edges.len(), 3);

    // 62.5 MB/s against 1000 / 8 = 125 -> half utilized
    let to_region = view.edges.iter().find(|e| e.target == "Region").unwrap();
    assert_eq!(to_region.utilization_pct, 50.0);
    assert_eq!(to_region.value, 62_501_000);
    assert_eq!(h.renderer.views.lock().len(), 1);
}

#[tokio::test]
async fn test_root_selection_and_redaction_take_effect_next_cycle() {
    let server = start_test_server().await;
    let mut h = harness(&server, 10);
    h.cycle.run_once().await.unwrap();

    assert!(h.projector.lock().select_root_by_name("Region"));
    h.ctx.ui.write().redact = true;

    let view = h.cycle.run_once().await.unwrap();
    assert_eq!(view.root_name.as_deref(), Some("Region"));
    assert_eq!(names(&view), vec!["Region", "Tower 1"]);
    assert!(view.nodes.iter().all(|n| n.label.is_none()));

    h.projector.lock().set_max_depth(0);
    let view = h.cycle.run_once().await.unwrap();
    assert_eq!(names(&view), vec!["Region"]);
}

#[tokio::test]
async fn test_failed_fetch_skips_render_then_recovers() {
    let server = start_test_server().await;
    let mut h = harness(&server, 10);

    server.state.failing.store(true, Ordering::SeqCst);
    assert!(h.cycle.run_once().await.is_none());
    assert!(h.renderer.views.lock().is_empty());

    server.state.failing.store(false, Ordering::SeqCst);
    assert!(h.cycle.run_once().await.is_some());
    assert_eq!(h.renderer.views.lock().len(), 1);
}

#[tokio::test]
async fn test_scheduled_polling_stops_on_shutdown() {
    let server = start_test_server().await;
    let h = harness(&server, 10);
    let renderer = h.renderer.clone();

    let task = ScheduledTask::spawn("tree-test", Duration::from_millis(20), h.cycle);
    tokio::time::timeout(Duration::from_secs(5), async {
        while renderer.views.lock().len() < 3 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("Timeout waiting for repeated cycles");

    task.shutdown().await;
    // Let a request that was already on the wire land.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let hits = server.state.hits.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(server.state.hits.load(Ordering::SeqCst), hits);
}

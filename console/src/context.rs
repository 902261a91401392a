//! Application context shared by the bus, the tree projector and the
//! command loop. Built once in `main` and passed around by `Arc`.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::watch;

use crate::auth::AuthSession;
use crate::store::LocalStore;

/// Which top-level view the console is showing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum View {
    #[default]
    Dashboard,
    Login,
}

/// UI state that request builders and renderers read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UiState {
    /// Chart time window sent with period-scoped requests, e.g. "5m"
    pub graph_period: String,
    /// Suppress node labels in rendered views
    pub redact: bool,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            graph_period: "5m".to_string(),
            redact: false,
        }
    }
}

pub struct AppContext {
    pub auth: AuthSession,
    pub ui: RwLock<UiState>,
    pub store: Arc<LocalStore>,
    view: watch::Sender<View>,
}

impl AppContext {
    pub fn new(store: Arc<LocalStore>, ui: UiState) -> Self {
        let (view, _) = watch::channel(View::default());
        Self {
            auth: AuthSession::new(store.clone()),
            ui: RwLock::new(ui),
            store,
            view,
        }
    }

    pub fn graph_period(&self) -> String {
        self.ui.read().graph_period.clone()
    }

    pub fn redacted(&self) -> bool {
        self.ui.read().redact
    }

    pub fn navigate(&self, view: View) {
        let previous = self.view.send_replace(view);
        if previous != view {
            tracing::info!(from = ?previous, to = ?view, "Switching view");
        }
    }

    pub fn current_view(&self) -> View {
        *self.view.borrow()
    }

    pub fn subscribe_view(&self) -> watch::Receiver<View> {
        self.view.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_navigation_is_observable() {
        let ctx = AppContext::new(Arc::new(LocalStore::in_memory()), UiState::default());
        let mut rx = ctx.subscribe_view();
        assert_eq!(ctx.current_view(), View::Dashboard);

        ctx.navigate(View::Login);

        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), View::Login);
        assert_eq!(ctx.current_view(), View::Login);
    }

    #[test]
    fn test_ui_state_defaults() {
        let ctx = AppContext::new(Arc::new(LocalStore::in_memory()), UiState::default());
        assert_eq!(ctx.graph_period(), "5m");
        assert!(!ctx.redacted());
    }
}

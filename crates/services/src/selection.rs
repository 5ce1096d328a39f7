//! Single-selection controller over lazily loaded detail content.
//!
//! Each selection takes a fresh request token. A fetch that completes after
//! its token was superseded never touches the view; if it succeeded for a key
//! the user walked away from, that key is flagged as having content ready.

use std::collections::HashSet;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::content_service::DetailSource;

/// What the detail pane should show.
#[derive(Debug, PartialEq)]
pub enum DetailView<K, V> {
    Idle,
    Loading {
        key: K,
    },
    Ready {
        key: K,
        content: Arc<V>,
    },
    Failed {
        key: K,
        message: String,
        offline: bool,
    },
}

impl<K: Clone, V> Clone for DetailView<K, V> {
    fn clone(&self) -> Self {
        match self {
            DetailView::Idle => DetailView::Idle,
            DetailView::Loading { key } => DetailView::Loading { key: key.clone() },
            DetailView::Ready { key, content } => DetailView::Ready {
                key: key.clone(),
                content: Arc::clone(content),
            },
            DetailView::Failed {
                key,
                message,
                offline,
            } => DetailView::Failed {
                key: key.clone(),
                message: message.clone(),
                offline: *offline,
            },
        }
    }
}

impl<K, V> DetailView<K, V> {
    #[must_use]
    pub fn key(&self) -> Option<&K> {
        match self {
            DetailView::Idle => None,
            DetailView::Loading { key }
            | DetailView::Ready { key, .. }
            | DetailView::Failed { key, .. } => Some(key),
        }
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        matches!(self, DetailView::Loading { .. })
    }
}

/// Published state of a `SelectionController`.
#[derive(Debug, PartialEq)]
pub struct SelectionSnapshot<K: Eq + Hash, V> {
    pub selected: Option<K>,
    pub view: DetailView<K, V>,
    /// Keys whose content finished loading after the user moved on.
    pub notifications: HashSet<K>,
}

impl<K: Clone + Eq + Hash, V> Clone for SelectionSnapshot<K, V> {
    fn clone(&self) -> Self {
        Self {
            selected: self.selected.clone(),
            view: self.view.clone(),
            notifications: self.notifications.clone(),
        }
    }
}

struct SelectionState<K: Eq + Hash, V> {
    token: u64,
    snapshot: SelectionSnapshot<K, V>,
}

/// Owns "which key is selected" and the view derived from it.
pub struct SelectionController<K: Eq + Hash, V> {
    source: Arc<dyn DetailSource<K, V>>,
    state: Arc<Mutex<SelectionState<K, V>>>,
    view_tx: Arc<watch::Sender<SelectionSnapshot<K, V>>>,
}

impl<K: Eq + Hash, V> Clone for SelectionController<K, V> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            state: Arc::clone(&self.state),
            view_tx: Arc::clone(&self.view_tx),
        }
    }
}

impl<K, V> SelectionController<K, V>
where
    K: Clone + Eq + Hash + std::fmt::Debug + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    #[must_use]
    pub fn new(source: Arc<dyn DetailSource<K, V>>) -> Self {
        let snapshot = SelectionSnapshot {
            selected: None,
            view: DetailView::Idle,
            notifications: HashSet::new(),
        };
        let (view_tx, _) = watch::channel(snapshot.clone());
        Self {
            source,
            state: Arc::new(Mutex::new(SelectionState { token: 0, snapshot })),
            view_tx: Arc::new(view_tx),
        }
    }

    /// Select `key`, replacing any previous selection.
    ///
    /// Cached content is shown at once and `None` is returned. Otherwise the
    /// view goes to `Loading` and the returned task settles it. Must be called
    /// from within a Tokio runtime.
    pub fn select(&self, key: K) -> Option<JoinHandle<()>> {
        let token = {
            let mut state = lock(&self.state);
            state.token += 1;
            state.snapshot.selected = Some(key.clone());
            state.snapshot.notifications.remove(&key);

            if let Some(content) = self.source.cached(&key) {
                state.snapshot.view = DetailView::Ready { key, content };
                self.view_tx.send_replace(state.snapshot.clone());
                return None;
            }

            state.snapshot.view = DetailView::Loading { key: key.clone() };
            self.view_tx.send_replace(state.snapshot.clone());
            state.token
        };

        let fetch = self.source.load(key.clone());
        let state = Arc::clone(&self.state);
        let view_tx = Arc::clone(&self.view_tx);
        Some(tokio::spawn(async move {
            let result = fetch.await;
            let mut state = lock(&state);

            if state.token == token {
                state.snapshot.view = match result {
                    Ok(content) => DetailView::Ready { key, content },
                    Err(err) => {
                        warn!(?key, error = %err, "detail fetch failed");
                        DetailView::Failed {
                            key,
                            message: err.user_message(),
                            offline: err.is_offline(),
                        }
                    }
                };
            } else if result.is_ok() && state.snapshot.selected.as_ref() != Some(&key) {
                debug!(?key, "detail ready for an abandoned selection");
                state.snapshot.notifications.insert(key);
            } else {
                return;
            }
            view_tx.send_replace(state.snapshot.clone());
        }))
    }

    /// Collapse the current selection.
    pub fn clear(&self) {
        let mut state = lock(&self.state);
        state.token += 1;
        state.snapshot.selected = None;
        state.snapshot.view = DetailView::Idle;
        self.view_tx.send_replace(state.snapshot.clone());
    }

    /// Select `key`, or collapse it if it is already selected.
    pub fn toggle(&self, key: K) -> Option<JoinHandle<()>> {
        let already = lock(&self.state).snapshot.selected.as_ref() == Some(&key);
        if already {
            self.clear();
            None
        } else {
            self.select(key)
        }
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SelectionSnapshot<K, V>> {
        self.view_tx.subscribe()
    }

    #[must_use]
    pub fn snapshot(&self) -> SelectionSnapshot<K, V> {
        lock(&self.state).snapshot.clone()
    }

    #[must_use]
    pub fn selected(&self) -> Option<K> {
        lock(&self.state).snapshot.selected.clone()
    }

    #[must_use]
    pub fn has_notification(&self, key: &K) -> bool {
        lock(&self.state).snapshot.notifications.contains(key)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

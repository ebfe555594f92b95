//! Rendered trending lists per presenter view.
//!
//! Every refresh of a view takes a ticket before fetching. A result is only
//! rendered if its ticket is still the newest one issued for that view, so a
//! slow, older request can never overwrite the answer to a newer one.
//!
//! The board keeps a bounded number of views and evicts the least recently
//! refreshed one when a new view would exceed it.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use serde::Serialize;

use crate::models::{Direction, HashtagCount};

pub const DEFAULT_CAPACITY: usize = 256;
const MAX_VIEW_ID_LEN: usize = 64;

/// View ids are short, client-chosen names like `feed` or `search-sidebar`.
#[must_use]
pub fn valid_view_id(view: &str) -> bool {
    !view.is_empty()
        && view.len() <= MAX_VIEW_ID_LEN
        && view.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ticket {
    view: String,
    seq: u64,
}

impl Ticket {
    #[must_use]
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct RenderedView {
    pub seq: u64,
    pub direction: Direction,
    pub hashtags: Vec<HashtagCount>,
}

#[derive(Default)]
struct ViewState {
    issued: u64,
    last_used: u64,
    rendered: Option<RenderedView>,
}

#[derive(Default)]
struct Views {
    states: HashMap<String, ViewState>,
    clock: u64,
}

impl Views {
    fn evict_least_recent(&mut self) {
        let oldest = self
            .states
            .iter()
            .min_by_key(|(_, state)| state.last_used)
            .map(|(view, _)| view.clone());
        if let Some(view) = oldest {
            tracing::debug!(view = %view, "evicting trending view");
            self.states.remove(&view);
        }
    }
}

#[derive(Clone)]
pub struct TrendingBoard {
    views: Arc<Mutex<Views>>,
    capacity: usize,
}

impl Default for TrendingBoard {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl TrendingBoard {
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            views: Arc::default(),
            capacity: capacity.max(1),
        }
    }

    fn views(&self) -> MutexGuard<'_, Views> {
        self.views.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn begin(&self, view: &str) -> Ticket {
        let mut views = self.views();
        if !views.states.contains_key(view) && views.states.len() >= self.capacity {
            views.evict_least_recent();
        }

        views.clock += 1;
        let now = views.clock;
        let state = views.states.entry(view.to_owned()).or_default();
        state.issued += 1;
        state.last_used = now;

        Ticket {
            view: view.to_owned(),
            seq: state.issued,
        }
    }

    /// Renders `hashtags` if `ticket` is the newest for its view. Returns
    /// whether it was rendered.
    pub fn complete(&self, ticket: &Ticket, direction: Direction, hashtags: Vec<HashtagCount>) -> bool {
        let mut views = self.views();
        let Some(state) = views.states.get_mut(&ticket.view) else {
            return false;
        };
        if state.issued != ticket.seq {
            tracing::debug!(
                view = %ticket.view,
                seq = ticket.seq,
                latest = state.issued,
                "discarding stale trending result"
            );
            return false;
        }

        state.rendered = Some(RenderedView {
            seq: ticket.seq,
            direction,
            hashtags,
        });
        true
    }

    #[must_use]
    pub fn rendered(&self, view: &str) -> Option<RenderedView> {
        self.views().states.get(view).and_then(|state| state.rendered.clone())
    }
}

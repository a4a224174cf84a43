//! Cache-first pagination over one listing.

use std::sync::Arc;

use leaderboard_core::{Cursor, Listing, PaginationState, Position, PrefetchPolicy};
use leaderboard_store::{eviction, LocalCache, PageKey, Storage};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, warn};

use crate::remote::{PageRequest, RemoteListing};

/// How a [`PaginationController::load`] call was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Served from the local cache without a network call.
    CacheHit,
    /// Fetched from the remote and cached.
    Fetched,
    /// The fetch failed; the view kept its rows.
    Failed,
}

/// Drives one listing view: navigation transitions, cache lookups, network
/// fallback, eviction and neighbour prefetch.
///
/// Operations take `&mut self` and run one at a time: a load holds the
/// controller across its fetch, so its ticket is always current when the
/// response lands. Prefetches run as spawned tasks that only write to the
/// cache; finished ones are reaped on the next load and
/// [`settle`](Self::settle) waits for the rest.
pub struct PaginationController<L: Listing, R, S> {
    state: PaginationState<L::SortField, L::Entity>,
    cache: LocalCache<L, S>,
    remote: Arc<R>,
    page_size: usize,
    prefetch: PrefetchPolicy,
    prefetches: JoinSet<()>,
}

impl<L, R, S> PaginationController<L, R, S>
where
    L: Listing,
    R: RemoteListing<L>,
    S: Storage + 'static,
{
    /// Controller on the first page, default sort, listing's default
    /// prefetch policy.
    pub fn new(remote: Arc<R>, storage: Arc<S>, page_size: usize) -> Self {
        Self {
            state: PaginationState::new(L::SortField::default()),
            cache: LocalCache::new(storage),
            remote,
            page_size,
            prefetch: L::DEFAULT_PREFETCH,
            prefetches: JoinSet::new(),
        }
    }

    /// Override the prefetch policy.
    #[must_use]
    pub const fn with_prefetch(mut self, policy: PrefetchPolicy) -> Self {
        self.prefetch = policy;
        self
    }

    /// Current view state.
    pub const fn state(&self) -> &PaginationState<L::SortField, L::Entity> {
        &self.state
    }

    /// Cache the controller reads and writes.
    pub const fn cache(&self) -> &LocalCache<L, S> {
        &self.cache
    }

    /// Populate the view for the current position, cache first.
    pub async fn load(&mut self) -> LoadOutcome {
        self.reap_prefetches();
        let position = self.state.position();
        let key = PageKey::for_position::<L>(&position);
        let ticket = self.state.load_started();

        if let Some(page) = self.cache.page(&key) {
            debug!(%key, "Cache hit");
            self.state.load_succeeded(ticket, page.entities, page.next_cursor);
            self.evict();
            if self.prefetch.on_cache_hit() {
                self.prefetch_neighbours();
            }
            return LoadOutcome::CacheHit;
        }

        debug!(%key, "Cache miss");
        let request = PageRequest::new(self.page_size, position.clone());
        match self.remote.fetch_page(&request).await {
            Ok(response) => {
                self.cache
                    .store_page(&position, &response.data, response.next_cursor.as_ref());
                self.state.load_succeeded(ticket, response.data, response.next_cursor);
                self.evict();
                if self.prefetch.after_fetch() {
                    self.prefetch_neighbours();
                }
                LoadOutcome::Fetched
            }
            Err(err) => {
                error!(namespace = L::NAMESPACE, %key, %err, "Error fetching players");
                self.state.load_failed(ticket);
                LoadOutcome::Failed
            }
        }
    }

    /// Warm the cache for `cursor` under the current sort.
    ///
    /// No-op for the first page or a page already cached. The spawned fetch
    /// never touches the view and never prefetches further.
    pub fn prefetch(&mut self, cursor: Option<&Cursor>) {
        let Some(cursor) = cursor else {
            return;
        };
        let position = self.state.position_at(Some(cursor.clone()));
        let key = PageKey::for_position::<L>(&position);
        if self.cache.contains_page(&key) {
            return;
        }

        let remote = Arc::clone(&self.remote);
        let cache = self.cache.clone();
        let request = PageRequest::new(self.page_size, position.clone());
        debug!(%key, "Prefetching");
        self.prefetches.spawn(async move {
            match remote.fetch_page(&request).await {
                Ok(response) => {
                    cache.store_page(&position, &response.data, response.next_cursor.as_ref());
                }
                Err(err) => warn!(%key, %err, "Error prefetching players"),
            }
        });
    }

    /// Prefetch tasks spawned but not yet joined.
    #[must_use]
    pub fn pending_prefetches(&self) -> usize {
        self.prefetches.len()
    }

    fn reap_prefetches(&mut self) {
        while let Some(joined) = self.prefetches.try_join_next() {
            log_join_error(joined);
        }
    }

    fn prefetch_neighbours(&mut self) {
        let next = self.state.next_cursor().cloned();
        self.prefetch(next.as_ref());
        if self.state.has_previous() {
            let previous = self.state.previous_cursor().cloned();
            self.prefetch(previous.as_ref());
        }
    }

    fn evict(&self) {
        let retain = eviction::retention_keys::<L>(&self.state);
        self.cache.evict_except(&retain);
    }

    /// Sort by `field` (flipping the order if it is already active) and
    /// return to the first page. Does not load.
    pub fn handle_sort(&mut self, field: L::SortField) {
        self.state.sort(field);
        self.evict();
    }

    /// Move to the next page if there is one. Does not load.
    pub fn handle_next(&mut self) -> bool {
        let moved = self.state.next();
        if moved {
            self.evict();
        }
        moved
    }

    /// Move back one page if possible. Does not load.
    pub fn handle_previous(&mut self) -> bool {
        let moved = self.state.previous();
        if moved {
            self.evict();
        }
        moved
    }

    /// [`handle_sort`](Self::handle_sort), then [`load`](Self::load).
    pub async fn sort(&mut self, field: L::SortField) -> LoadOutcome {
        self.handle_sort(field);
        self.load().await
    }

    /// [`handle_next`](Self::handle_next), then [`load`](Self::load).
    /// `None` when there is no next page.
    pub async fn next(&mut self) -> Option<LoadOutcome> {
        if !self.handle_next() {
            return None;
        }
        Some(self.load().await)
    }

    /// [`handle_previous`](Self::handle_previous), then [`load`](Self::load).
    /// `None` on the first page.
    pub async fn previous(&mut self) -> Option<LoadOutcome> {
        if !self.handle_previous() {
            return None;
        }
        Some(self.load().await)
    }

    /// Wait for outstanding prefetches, then re-apply eviction so the cache
    /// holds no more than the retained pages.
    pub async fn settle(&mut self) {
        while let Some(joined) = self.prefetches.join_next().await {
            log_join_error(joined);
        }
        self.evict();
    }

    /// Position the next [`load`](Self::load) will request.
    pub fn position(&self) -> Position<L::SortField> {
        self.state.position()
    }
}

fn log_join_error(joined: Result<(), JoinError>) {
    if let Err(err) = joined {
        warn!(%err, "Prefetch task failed");
    }
}

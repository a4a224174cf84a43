//! End-to-end pagination: controller → cache → in-process listing service.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use leaderboard_app::{
    ListingParams, ListingService, LoadOutcome, MemoryCollection, PageRequest, PageResponse,
    PaginationController, RemoteError, RemoteListing,
};
use leaderboard_core::{
    Cursor, Listing, Milb, MilbSortField, Mlb, PlayerMilb, PlayerMlb, PrefetchPolicy,
    SortField, SortOrder,
};
use leaderboard_store::{FileStorage, MemoryStorage};

/// Remote that answers from a [`ListingService`] and counts requests.
struct ServiceRemote<L: Listing> {
    service: ListingService<L, MemoryCollection<L>>,
    calls: AtomicUsize,
    down: AtomicBool,
}

impl<L: Listing> ServiceRemote<L> {
    fn new(rows: Vec<L::Entity>) -> Arc<Self> {
        Arc::new(Self {
            service: ListingService::new(MemoryCollection::new(rows), Duration::from_secs(10)),
            calls: AtomicUsize::new(0),
            down: AtomicBool::new(false),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl<L: Listing> RemoteListing<L> for ServiceRemote<L> {
    async fn fetch_page(
        &self,
        request: &PageRequest<L::SortField>,
    ) -> Result<PageResponse<L::Entity>, RemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.down.load(Ordering::SeqCst) {
            return Err(RemoteError::Server {
                status: 500,
                body: r#"{"error":"Query timeout"}"#.into(),
            });
        }
        let params = ListingParams {
            limit: Some(request.limit.to_string()),
            sort_field: Some(request.sort_field.as_str().to_owned()),
            sort_order: Some(request.sort_order.as_str().to_owned()),
            cursor: request.cursor.as_ref().map(|c| c.as_str().to_owned()),
        };
        self.service.page(&params).await.map_err(|err| RemoteError::Server {
            status: 400,
            body: err.to_string(),
        })
    }
}

fn milb_players(n: u32) -> Vec<PlayerMilb> {
    (1..=n)
        .rev()
        .map(|i| PlayerMilb {
            id: format!("p{i}"),
            rank: i,
            ..PlayerMilb::default()
        })
        .collect()
}

fn mlb_players(n: u16) -> Vec<PlayerMlb> {
    (0..n)
        .map(|i| PlayerMlb {
            id: format!("m{i}"),
            season: 2000 + i,
            ..PlayerMlb::default()
        })
        .collect()
}

fn ids(rows: &[PlayerMilb]) -> (String, String, usize) {
    (
        rows.first().map(|p| p.id.clone()).unwrap_or_default(),
        rows.last().map(|p| p.id.clone()).unwrap_or_default(),
        rows.len(),
    )
}

#[tokio::test]
async fn milb_pages_forward_and_back_from_cache() {
    let remote = ServiceRemote::<Milb>::new(milb_players(70));
    let storage = Arc::new(MemoryStorage::new());
    let mut controller = PaginationController::<Milb, _, _>::new(Arc::clone(&remote), storage, 30);

    assert_eq!(controller.load().await, LoadOutcome::Fetched);
    assert_eq!(ids(controller.state().rows()), ("p1".into(), "p30".into(), 30));
    assert_eq!(
        controller.state().next_cursor(),
        Some(&Cursor::from(r#"{"value":30,"id":"p30"}"#))
    );
    controller.settle().await;
    assert_eq!(remote.calls(), 2, "first page plus prefetch of page two");

    assert_eq!(controller.next().await, Some(LoadOutcome::CacheHit));
    assert_eq!(ids(controller.state().rows()), ("p31".into(), "p60".into(), 30));
    assert_eq!(controller.state().page_number(), 2);
    controller.settle().await;
    assert_eq!(remote.calls(), 3, "page three prefetched");

    assert_eq!(controller.previous().await, Some(LoadOutcome::CacheHit));
    assert_eq!(ids(controller.state().rows()), ("p1".into(), "p30".into(), 30));
    assert!(!controller.state().has_previous());
    controller.settle().await;
    assert_eq!(remote.calls(), 3, "going back never touches the network");
    assert_eq!(controller.previous().await, None);
}

#[tokio::test]
async fn page_keys_stay_bounded_while_navigating() {
    let remote = ServiceRemote::<Milb>::new(milb_players(200));
    let storage = Arc::new(MemoryStorage::new());
    let mut controller = PaginationController::<Milb, _, _>::new(Arc::clone(&remote), storage, 20);

    controller.load().await;
    controller.settle().await;
    for _ in 0..6 {
        assert!(controller.next().await.is_some());
        controller.settle().await;
        assert!(controller.cache().page_keys().len() <= 3);
    }
    assert_eq!(ids(controller.state().rows()), ("p121".into(), "p140".into(), 20));
    for _ in 0..3 {
        assert!(controller.previous().await.is_some());
        controller.settle().await;
        assert!(controller.cache().page_keys().len() <= 3);
    }
    assert_eq!(controller.state().page_number(), 4);
    assert_eq!(controller.cache().entity_map().len(), 160);
}

#[tokio::test]
async fn finished_prefetches_are_reaped_while_browsing() {
    let remote = ServiceRemote::<Milb>::new(milb_players(200));
    let storage = Arc::new(MemoryStorage::new());
    let mut controller = PaginationController::<Milb, _, _>::new(Arc::clone(&remote), storage, 10);

    controller.load().await;
    for _ in 0..19 {
        tokio::task::yield_now().await;
        assert!(controller.next().await.is_some());
        assert!(controller.pending_prefetches() <= 2);
    }
    assert_eq!(controller.next().await, None);
    controller.settle().await;
    assert_eq!(controller.pending_prefetches(), 0);
    assert_eq!(ids(controller.state().rows()), ("p191".into(), "p200".into(), 10));
}

#[tokio::test]
async fn warm_cache_load_makes_no_network_call() {
    let remote = ServiceRemote::<Mlb>::new(mlb_players(45));
    let storage = Arc::new(MemoryStorage::new());
    let mut controller = PaginationController::<Mlb, _, _>::new(Arc::clone(&remote), storage, 30);

    assert_eq!(controller.load().await, LoadOutcome::Fetched);
    controller.settle().await;
    assert_eq!(remote.calls(), 1, "mlb does not prefetch by default");
    assert_eq!(controller.load().await, LoadOutcome::CacheHit);
    assert_eq!(controller.load().await, LoadOutcome::CacheHit);
    assert_eq!(remote.calls(), 1);
    assert_eq!(controller.state().next_cursor(), Some(&Cursor::from("2029")));

    assert_eq!(controller.next().await, Some(LoadOutcome::Fetched));
    assert_eq!(controller.state().rows().len(), 15);
    assert_eq!(controller.state().next_cursor(), None);
    assert_eq!(controller.next().await, None);
}

#[tokio::test]
async fn mlb_prefetch_can_be_enabled() {
    let remote = ServiceRemote::<Mlb>::new(mlb_players(45));
    let storage = Arc::new(MemoryStorage::new());
    let mut controller = PaginationController::<Mlb, _, _>::new(Arc::clone(&remote), storage, 30)
        .with_prefetch(PrefetchPolicy::AfterFetch);

    controller.load().await;
    controller.settle().await;
    assert_eq!(remote.calls(), 2);
    assert_eq!(controller.next().await, Some(LoadOutcome::CacheHit));
    controller.settle().await;
    assert_eq!(remote.calls(), 2, "after-fetch policy skips prefetch on cache hits");
}

#[tokio::test]
async fn sort_resets_to_first_page() {
    let remote = ServiceRemote::<Milb>::new(milb_players(70));
    let storage = Arc::new(MemoryStorage::new());
    let mut controller = PaginationController::<Milb, _, _>::new(Arc::clone(&remote), storage, 30);

    controller.load().await;
    controller.next().await;
    assert!(controller.state().has_previous());

    controller.sort(MilbSortField::Rank).await;
    assert!(controller.state().cursor_history().is_empty());
    assert_eq!(controller.state().current_cursor(), None);
    assert_eq!(controller.state().sort_order(), SortOrder::Desc);
    assert_eq!(ids(controller.state().rows()), ("p70".into(), "p41".into(), 30));

    controller.sort(MilbSortField::MWar).await;
    assert_eq!(controller.state().sort_field(), MilbSortField::MWar);
    assert_eq!(controller.state().sort_order(), SortOrder::Asc);
}

#[tokio::test]
async fn failed_fetch_keeps_last_rows() {
    let remote = ServiceRemote::<Mlb>::new(mlb_players(45));
    let storage = Arc::new(MemoryStorage::new());
    let mut controller = PaginationController::<Mlb, _, _>::new(Arc::clone(&remote), storage, 30);

    controller.load().await;
    let first_page = controller.state().rows().to_vec();
    remote.down.store(true, Ordering::SeqCst);

    assert_eq!(controller.next().await, Some(LoadOutcome::Failed));
    assert_eq!(controller.state().rows(), first_page.as_slice());
    assert!(!controller.state().is_loading());

    remote.down.store(false, Ordering::SeqCst);
    assert_eq!(controller.load().await, LoadOutcome::Fetched);
    assert_eq!(controller.state().rows()[0].season, 2030);
}

#[tokio::test]
async fn file_cache_survives_a_restart() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("cache.json");
    let remote = ServiceRemote::<Milb>::new(milb_players(40));

    {
        let storage = Arc::new(FileStorage::open(&path, None).expect("open cache"));
        let mut controller =
            PaginationController::<Milb, _, _>::new(Arc::clone(&remote), storage, 30);
        controller.load().await;
        controller.settle().await;
    }
    let calls = remote.calls();

    let storage = Arc::new(FileStorage::open(&path, None).expect("reopen cache"));
    let mut controller = PaginationController::<Milb, _, _>::new(Arc::clone(&remote), storage, 30);
    assert_eq!(controller.load().await, LoadOutcome::CacheHit);
    assert_eq!(controller.next().await, Some(LoadOutcome::CacheHit));
    assert_eq!(ids(controller.state().rows()), ("p31".into(), "p40".into(), 10));
    controller.settle().await;
    assert_eq!(remote.calls(), calls);
}

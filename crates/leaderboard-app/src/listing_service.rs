//! Server side of `/api/players/<ns>`: parameter validation, keyset query,
//! next-cursor derivation.

use std::cmp::Ordering;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use leaderboard_core::cursor::{self, QueryBound};
use leaderboard_core::{
    clamp_limit, Cursor, CursorError, CursorStyle, Listing, SortField, SortOrder, UnknownSortField,
    DEFAULT_PAGE_SIZE,
};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error};

use crate::remote::PageResponse;

/// Raw query string of a listing request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingParams {
    pub limit: Option<String>,
    pub sort_field: Option<String>,
    pub sort_order: Option<String>,
    pub cursor: Option<String>,
}

/// Why a listing request was not served.
#[derive(Debug, Error)]
pub enum ListingError {
    #[error(transparent)]
    InvalidSortField(#[from] UnknownSortField),
    #[error("Invalid cursor format")]
    InvalidCursor(#[from] CursorError),
    #[error("Query timeout")]
    Timeout,
    #[error("{0}")]
    Database(String),
}

impl ListingError {
    /// Whether the caller sent a bad request (as opposed to a server fault).
    pub const fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidSortField(_) | Self::InvalidCursor(_))
    }

    /// Message returned to clients. Sort-field errors do not echo the input.
    pub fn public_message(&self) -> String {
        match self {
            Self::InvalidSortField(_) => "Invalid sort field".to_owned(),
            other => other.to_string(),
        }
    }

    /// Machine-readable error code.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidSortField(_) => "INVALID_SORT_FIELD",
            Self::InvalidCursor(_) => "INVALID_CURSOR",
            Self::Timeout => "QUERY_TIMEOUT",
            Self::Database(_) => "DATABASE_ERROR",
        }
    }
}

/// Ordered, bounded scan over a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderedQuery<F> {
    pub sort_field: F,
    pub sort_order: SortOrder,
    /// Rows strictly before (and at) this bound are skipped.
    pub start_after: Option<QueryBound>,
    /// Maximum rows returned.
    pub limit: usize,
}

/// Backing store of one listing.
pub trait DocumentCollection<L: Listing>: Send + Sync + 'static {
    /// Run `query` and return at most `query.limit` rows.
    fn query(
        &self,
        query: &OrderedQuery<L::SortField>,
    ) -> impl Future<Output = Result<Vec<L::Entity>, ListingError>> + Send;
}

/// In-process collection ordered with the rules of the listing's cursor
/// style.
///
/// Composite listings order by `(field, id)` in the requested direction.
/// Scalar listings order by the field alone, ties broken by ascending id,
/// and resume strictly after the bound value.
pub struct MemoryCollection<L: Listing> {
    rows: Vec<L::Entity>,
}

impl<L: Listing> Clone for MemoryCollection<L> {
    fn clone(&self) -> Self {
        Self {
            rows: self.rows.clone(),
        }
    }
}

impl<L: Listing> Default for MemoryCollection<L> {
    fn default() -> Self {
        Self { rows: Vec::new() }
    }
}

impl<L: Listing> MemoryCollection<L> {
    /// Collection holding `rows` in any order.
    pub const fn new(rows: Vec<L::Entity>) -> Self {
        Self { rows }
    }

    /// Number of documents.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the collection holds no documents.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn compare(query: &OrderedQuery<L::SortField>, a: &L::Entity, b: &L::Entity) -> Ordering {
        let by_value = L::sort_value(a, query.sort_field).cmp(&L::sort_value(b, query.sort_field));
        let by_id = L::entity_id(a).cmp(L::entity_id(b));
        match L::CURSOR_STYLE {
            CursorStyle::Composite => query.sort_order.apply(by_value.then(by_id)),
            CursorStyle::Scalar => query.sort_order.apply(by_value).then(by_id),
        }
    }

    fn is_after(query: &OrderedQuery<L::SortField>, row: &L::Entity) -> bool {
        let value = L::sort_value(row, query.sort_field);
        let past = match &query.start_after {
            None => return true,
            Some(QueryBound::After { value: bound, id }) => {
                value.cmp(bound).then_with(|| L::entity_id(row).cmp(id.as_str()))
            }
            Some(QueryBound::AfterValue(bound)) => value.cmp(bound),
        };
        query.sort_order.apply(past) == Ordering::Greater
    }

    /// Evaluate `query` synchronously.
    pub fn run(&self, query: &OrderedQuery<L::SortField>) -> Vec<L::Entity> {
        let mut matching: Vec<&L::Entity> =
            self.rows.iter().filter(|row| Self::is_after(query, row)).collect();
        matching.sort_by(|a, b| Self::compare(query, a, b));
        matching.into_iter().take(query.limit).cloned().collect()
    }
}

impl<L: Listing> DocumentCollection<L> for MemoryCollection<L> {
    async fn query(&self, query: &OrderedQuery<L::SortField>) -> Result<Vec<L::Entity>, ListingError> {
        Ok(self.run(query))
    }
}

impl<L: Listing, C: DocumentCollection<L>> DocumentCollection<L> for Arc<C> {
    fn query(
        &self,
        query: &OrderedQuery<L::SortField>,
    ) -> impl Future<Output = Result<Vec<L::Entity>, ListingError>> + Send {
        (**self).query(query)
    }
}

/// Serves pages of listing `L` from collection `C`.
pub struct ListingService<L, C> {
    collection: C,
    timeout: Duration,
    _listing: PhantomData<fn() -> L>,
}

impl<L: Listing, C: DocumentCollection<L>> ListingService<L, C> {
    /// Service over `collection`, giving up on a query after `timeout`.
    pub const fn new(collection: C, timeout: Duration) -> Self {
        Self {
            collection,
            timeout,
            _listing: PhantomData,
        }
    }

    /// Validate `params` and build the query they describe.
    pub fn parse(params: &ListingParams) -> Result<OrderedQuery<L::SortField>, ListingError> {
        let limit = params
            .limit
            .as_deref()
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .map_or(DEFAULT_PAGE_SIZE, |n| usize::try_from(n.max(1)).unwrap_or(DEFAULT_PAGE_SIZE));
        let sort_field = match params.sort_field.as_deref() {
            None | Some("") => L::SortField::default(),
            Some(raw) => L::SortField::parse(raw)?,
        };
        let start_after = params
            .cursor
            .as_deref()
            .filter(|raw| !raw.is_empty())
            .map(|raw| cursor::decode::<L>(&Cursor::from(raw), sort_field))
            .transpose()?;
        Ok(OrderedQuery {
            sort_field,
            sort_order: SortOrder::from_param(params.sort_order.as_deref()),
            start_after,
            limit: clamp_limit(limit),
        })
    }

    /// Serve one page.
    ///
    /// One extra row is read to learn whether another page exists; the next
    /// cursor then points just past the last row returned.
    pub async fn page(&self, params: &ListingParams) -> Result<PageResponse<L::Entity>, ListingError> {
        let query = Self::parse(params)?;
        let limit = query.limit;
        let probe = OrderedQuery {
            limit: limit + 1,
            ..query.clone()
        };

        let mut rows = match tokio::time::timeout(self.timeout, self.collection.query(&probe)).await {
            Ok(result) => result?,
            Err(_) => {
                error!(collection = L::COLLECTION, timeout = ?self.timeout, "Query timeout");
                return Err(ListingError::Timeout);
            }
        };

        let next_cursor = if rows.len() > limit {
            rows.truncate(limit);
            rows.last().and_then(|last| cursor::encode::<L>(last, query.sort_field))
        } else {
            None
        };
        debug!(
            collection = L::COLLECTION,
            rows = rows.len(),
            has_next = next_cursor.is_some(),
            "Served page"
        );
        Ok(PageResponse {
            data: rows,
            next_cursor,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leaderboard_core::{
        Milb, MilbSortField, MilbStat, Mlb, MlbSortField, MlbStat, PlayerMilb, PlayerMlb, TeamRef,
    };

    fn milb(n: u32) -> PlayerMilb {
        PlayerMilb {
            id: format!("p{n}"),
            rank: n,
            last_name: format!("Last{n:03}"),
            team: TeamRef {
                id: format!("t{}", n % 3),
                name: format!("Team {}", n % 3),
                image: String::new(),
            },
            stat: MilbStat {
                m_war: f64::from(n % 5),
                ..MilbStat::default()
            },
            ..PlayerMilb::default()
        }
    }

    fn mlb(id: &str, season: u16, war: f64) -> PlayerMlb {
        PlayerMlb {
            id: id.into(),
            season,
            stat: MlbStat {
                war,
                ..MlbStat::default()
            },
            ..PlayerMlb::default()
        }
    }

    fn milb_service(n: u32) -> ListingService<Milb, MemoryCollection<Milb>> {
        let rows = (1..=n).rev().map(milb).collect();
        ListingService::new(MemoryCollection::new(rows), Duration::from_secs(10))
    }

    fn params(pairs: &[(&str, &str)]) -> ListingParams {
        let mut params = ListingParams::default();
        for (key, value) in pairs {
            let slot = match *key {
                "limit" => &mut params.limit,
                "sortField" => &mut params.sort_field,
                "sortOrder" => &mut params.sort_order,
                _ => &mut params.cursor,
            };
            *slot = Some((*value).to_owned());
        }
        params
    }

    fn ids(page: &PageResponse<PlayerMilb>) -> Vec<&str> {
        page.data.iter().map(|p| p.id.as_str()).collect()
    }

    #[tokio::test]
    async fn default_page_is_thirty_by_rank() -> Result<(), ListingError> {
        let service = milb_service(70);
        let page = service.page(&ListingParams::default()).await?;
        assert_eq!(page.data.len(), 30);
        assert_eq!(page.data[0].id, "p1");
        assert_eq!(page.data[29].id, "p30");
        let next = page.next_cursor.as_ref().map(Cursor::as_str);
        assert_eq!(next, Some(r#"{"value":30,"id":"p30"}"#));

        let page2 = service
            .page(&params(&[("cursor", r#"{"value":30,"id":"p30"}"#)]))
            .await?;
        assert_eq!(page2.data.first().map(|p| p.id.as_str()), Some("p31"));
        assert_eq!(page2.data.last().map(|p| p.id.as_str()), Some("p60"));
        Ok(())
    }

    #[tokio::test]
    async fn last_page_has_no_cursor() -> Result<(), ListingError> {
        let service = milb_service(5);
        let page = service.page(&params(&[("limit", "5")])).await?;
        assert_eq!(page.data.len(), 5);
        assert!(page.next_cursor.is_none());

        let empty = milb_service(0).page(&ListingParams::default()).await?;
        assert!(empty.data.is_empty());
        assert!(empty.next_cursor.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn composite_ties_break_on_id() -> Result<(), ListingError> {
        let service = milb_service(10);
        let mut seen = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let mut pairs = vec![("limit", "3"), ("sortField", "stat.mWar"), ("sortOrder", "desc")];
            if let Some(c) = cursor.as_deref() {
                pairs.push(("cursor", c));
            }
            let page = service.page(&params(&pairs)).await?;
            seen.extend(ids(&page).into_iter().map(str::to_owned));
            match page.next_cursor {
                Some(next) => cursor = Some(next.as_str().to_owned()),
                None => break,
            }
        }
        assert_eq!(seen.len(), 10);
        let mut unique = seen.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 10);
        assert!(seen[0] == "p9" || seen[0] == "p4");
        Ok(())
    }

    #[test]
    fn limit_is_clamped_and_defaults_when_unparsable() -> Result<(), ListingError> {
        type Service = ListingService<Milb, MemoryCollection<Milb>>;
        assert_eq!(Service::parse(&params(&[("limit", "500")]))?.limit, 100);
        assert_eq!(Service::parse(&params(&[("limit", "0")]))?.limit, 1);
        assert_eq!(Service::parse(&params(&[("limit", "-4")]))?.limit, 1);
        assert_eq!(Service::parse(&params(&[("limit", "lots")]))?.limit, 30);
        Ok(())
    }

    #[test]
    fn sort_order_defaults_to_ascending() -> Result<(), ListingError> {
        type Service = ListingService<Milb, MemoryCollection<Milb>>;
        assert_eq!(Service::parse(&params(&[("sortOrder", "DESC")]))?.sort_order, SortOrder::Asc);
        assert_eq!(Service::parse(&params(&[("sortOrder", "desc")]))?.sort_order, SortOrder::Desc);
        assert_eq!(Service::parse(&ListingParams::default())?.sort_field, MilbSortField::Rank);
        Ok(())
    }

    #[tokio::test]
    async fn bad_requests_are_client_errors() {
        let service = milb_service(3);
        let err = service.page(&params(&[("sortField", "bogus")])).await.err();
        assert!(matches!(err, Some(ListingError::InvalidSortField(_))));
        assert_eq!(err.map(|e| e.public_message()).as_deref(), Some("Invalid sort field"));

        for bad in ["not json", r#"{"value":1}"#, r#"{"id":"p1"}"#, "[1,2]", "null"] {
            let err = service.page(&params(&[("cursor", bad)])).await.err();
            assert!(
                matches!(&err, Some(e @ ListingError::InvalidCursor(_)) if e.is_client_error()),
                "{bad}"
            );
        }
    }

    #[tokio::test]
    async fn scalar_listing_resumes_after_value() -> Result<(), ListingError> {
        let rows = vec![
            mlb("a", 2019, 1.0),
            mlb("b", 2020, 2.5),
            mlb("c", 2021, 0.5),
            mlb("d", 2022, 4.0),
        ];
        let service: ListingService<Mlb, _> =
            ListingService::new(MemoryCollection::<Mlb>::new(rows), Duration::from_secs(10));

        let first = service.page(&params(&[("limit", "2")])).await?;
        assert_eq!(first.next_cursor, Some(Cursor::from("2020")));
        let second = service
            .page(&params(&[("limit", "2"), ("cursor", "2020")]))
            .await?;
        let seasons: Vec<u16> = second.data.iter().map(|p| p.season).collect();
        assert_eq!(seasons, [2021, 2022]);
        assert!(second.next_cursor.is_none());

        let by_war = service
            .page(&params(&[("sortField", "stat.war"), ("sortOrder", "desc"), ("limit", "1")]))
            .await?;
        assert_eq!(by_war.data[0].id, "d");
        assert_eq!(by_war.next_cursor, Some(Cursor::from("4")));

        let err = service
            .page(&params(&[("sortField", "season"), ("cursor", "next year")]))
            .await
            .err();
        assert!(matches!(err, Some(ListingError::InvalidCursor(_))));
        assert!(service.page(&params(&[("sortField", "bogus")])).await.is_err());
        Ok(())
    }

    struct Stalled;

    impl DocumentCollection<Mlb> for Stalled {
        async fn query(&self, _query: &OrderedQuery<MlbSortField>) -> Result<Vec<PlayerMlb>, ListingError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Vec::new())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_query_times_out() {
        let service = ListingService::<Mlb, _>::new(Stalled, Duration::from_secs(10));
        let err = service.page(&ListingParams::default()).await.err();
        assert!(matches!(err, Some(ListingError::Timeout)));
        assert!(!ListingError::Timeout.is_client_error());
    }
}

//! Domain types for the bWAR leaderboard: player records, listing
//! descriptors, the cursor codec and the pagination state machine.

/// Opaque pagination cursors.
pub mod cursor;
/// Listing descriptors and their sort fields.
pub mod listing;
/// Explicit navigation/view state.
pub mod navigation;
/// Player record schemas.
pub mod player;
/// Sort direction and typed sort-key values.
pub mod sort;

pub use cursor::{Cursor, CursorError, QueryBound};
pub use listing::{
    CursorStyle, Listing, Milb, MilbSortField, Mlb, MlbSortField, PrefetchPolicy, SortField,
    UnknownSortField,
};
pub use navigation::{LoadTicket, PaginationState, Position};
pub use player::{MilbStat, MlbStat, PlayerMilb, PlayerMlb, TeamLogo, TeamRef};
pub use sort::{FieldValue, SortOrder};

/// Hard upper bound on rows per page, enforced by clients and the server.
pub const MAX_LIMIT: usize = 100;

/// Rows per page when nothing else is configured.
pub const DEFAULT_PAGE_SIZE: usize = 30;

/// Clamp a requested page size into `1..=MAX_LIMIT`.
#[must_use]
pub fn clamp_limit(limit: usize) -> usize {
    limit.clamp(1, MAX_LIMIT)
}

use std::borrow::Cow;
use std::fmt;

use leaderboard_core::{Cursor, Listing, Position, SortField, SortOrder};

const FIRST_PAGE: &str = "start";
const ESCAPE: char = '~';

/// Storage key of one page-index record:
/// `<namespace>_<cursor | start>_sort_<field>_<order>`.
///
/// A cursor that reads `start`, or already begins with `~`, gets a `~`
/// prefix so it never collides with the first-page sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageKey(String);

impl PageKey {
    /// Build the key for a page of `namespace`.
    #[must_use]
    pub fn new(namespace: &str, cursor: Option<&Cursor>, sort_field: &str, sort_order: SortOrder) -> Self {
        let segment = cursor_segment(cursor);
        Self(format!("{namespace}_{segment}_sort_{sort_field}_{sort_order}"))
    }

    /// Key of the page a navigation position points at.
    #[must_use]
    pub fn for_position<L: Listing>(position: &Position<L::SortField>) -> Self {
        Self::new(
            L::NAMESPACE,
            position.cursor.as_ref(),
            position.sort_field.as_str(),
            position.sort_order,
        )
    }

    /// Prefix shared by every page key of `namespace`.
    #[must_use]
    pub fn namespace_prefix(namespace: &str) -> String {
        format!("{namespace}_")
    }

    /// Raw storage key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn cursor_segment(cursor: Option<&Cursor>) -> Cow<'_, str> {
    match cursor.map(Cursor::as_str) {
        None => Cow::Borrowed(FIRST_PAGE),
        Some(text) if text == FIRST_PAGE || text.starts_with(ESCAPE) => {
            Cow::Owned(format!("{ESCAPE}{text}"))
        }
        Some(text) => Cow::Borrowed(text),
    }
}

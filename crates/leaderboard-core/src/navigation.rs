use std::mem;

use crate::cursor::Cursor;
use crate::sort::SortOrder;

/// Identity of one page request: where, sorted how.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Position<F> {
    /// Cursor of the page, `None` for the first page.
    pub cursor: Option<Cursor>,
    /// Active sort field.
    pub sort_field: F,
    /// Active sort order.
    pub sort_order: SortOrder,
}

/// Receipt for a started load. Completing a load with a ticket from an older
/// generation does not touch the visible rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct LoadTicket {
    generation: u64,
}

/// Everything a listing view shows, changed only through its transitions.
///
/// Every transition that moves the position (`sort`, `next`, `previous`)
/// bumps the generation, so responses to requests issued before the move are
/// recognised as stale.
#[derive(Debug, Clone)]
pub struct PaginationState<F, E> {
    rows: Vec<E>,
    in_flight: Option<u64>,
    sort_field: F,
    sort_order: SortOrder,
    current: Option<Cursor>,
    history: Vec<Option<Cursor>>,
    next: Option<Cursor>,
    generation: u64,
}

impl<F: Copy + PartialEq, E> PaginationState<F, E> {
    /// First page, ascending by `sort_field`, nothing loaded yet.
    #[must_use]
    pub const fn new(sort_field: F) -> Self {
        Self {
            rows: Vec::new(),
            in_flight: None,
            sort_field,
            sort_order: SortOrder::Asc,
            current: None,
            history: Vec::new(),
            next: None,
            generation: 0,
        }
    }

    /// Rows of the current page.
    #[must_use]
    pub fn rows(&self) -> &[E] {
        &self.rows
    }

    /// Whether the latest load has not completed yet.
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Active sort field.
    #[must_use]
    pub const fn sort_field(&self) -> F {
        self.sort_field
    }

    /// Active sort order.
    #[must_use]
    pub const fn sort_order(&self) -> SortOrder {
        self.sort_order
    }

    /// Cursor of the current page.
    #[must_use]
    pub const fn current_cursor(&self) -> Option<&Cursor> {
        self.current.as_ref()
    }

    /// Cursor of the following page, once known.
    #[must_use]
    pub const fn next_cursor(&self) -> Option<&Cursor> {
        self.next.as_ref()
    }

    /// Back-stack of visited cursors, oldest first.
    #[must_use]
    pub fn cursor_history(&self) -> &[Option<Cursor>] {
        &self.history
    }

    /// Cursor of the page `previous` would return to. `None` is the first page.
    #[must_use]
    pub fn previous_cursor(&self) -> Option<&Cursor> {
        self.history.last().and_then(Option::as_ref)
    }

    /// Whether `previous` would move.
    #[must_use]
    pub fn has_previous(&self) -> bool {
        !self.history.is_empty()
    }

    /// 1-based page number of the current page.
    #[must_use]
    pub fn page_number(&self) -> usize {
        self.history.len() + 1
    }

    /// Counter bumped on every position change.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// The page request the current state asks for.
    #[must_use]
    pub fn position(&self) -> Position<F> {
        self.position_at(self.current.clone())
    }

    /// Same sort as the current state, at another cursor.
    #[must_use]
    pub fn position_at(&self, cursor: Option<Cursor>) -> Position<F> {
        Position {
            cursor,
            sort_field: self.sort_field,
            sort_order: self.sort_order,
        }
    }

    /// Sort by `field`: flip the order when it is already active, otherwise
    /// switch to it ascending. Always returns to the first page.
    pub fn sort(&mut self, field: F) {
        if field == self.sort_field {
            self.sort_order = self.sort_order.flipped();
        } else {
            self.sort_field = field;
            self.sort_order = SortOrder::Asc;
        }
        self.current = None;
        self.history.clear();
        self.next = None;
        self.bump();
    }

    /// Advance to the next page. Returns `false` when there is none.
    pub fn next(&mut self) -> bool {
        let Some(next) = self.next.take() else {
            return false;
        };
        let left = mem::replace(&mut self.current, Some(next));
        self.history.push(left);
        self.bump();
        true
    }

    /// Go back one page. Returns `false` on the first page.
    ///
    /// The page being left is, by construction, the next page of the one we
    /// return to, so it stays reachable as `next_cursor` until the load lands.
    pub fn previous(&mut self) -> bool {
        let Some(back) = self.history.pop() else {
            return false;
        };
        self.next = mem::replace(&mut self.current, back);
        self.bump();
        true
    }

    /// Mark a load of the current position as started.
    pub fn load_started(&mut self) -> LoadTicket {
        self.in_flight = Some(self.generation);
        LoadTicket {
            generation: self.generation,
        }
    }

    /// Whether `ticket` still describes the current position.
    #[must_use]
    pub const fn is_current(&self, ticket: LoadTicket) -> bool {
        ticket.generation == self.generation
    }

    /// Apply a completed load. Returns `false`, leaving rows untouched, when
    /// the position moved since the load started.
    pub fn load_succeeded(&mut self, ticket: LoadTicket, rows: Vec<E>, next: Option<Cursor>) -> bool {
        self.finish(ticket);
        if !self.is_current(ticket) {
            return false;
        }
        self.rows = rows;
        self.next = next;
        true
    }

    /// Record a failed load. Rows stay at their last good value.
    pub fn load_failed(&mut self, ticket: LoadTicket) {
        self.finish(ticket);
    }

    fn finish(&mut self, ticket: LoadTicket) {
        if self.in_flight == Some(ticket.generation) {
            self.in_flight = None;
        }
    }

    fn bump(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }
}

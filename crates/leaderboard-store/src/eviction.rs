use leaderboard_core::{Listing, PaginationState};

use crate::key::PageKey;

/// Page-index keys worth keeping for the state's position: the page
/// `previous` would return to (the first page when there is no history),
/// the current page, and the known next page.
///
/// Duplicates collapse, so the result never holds more than three keys.
#[must_use]
pub fn retention_keys<L: Listing>(state: &PaginationState<L::SortField, L::Entity>) -> Vec<PageKey> {
    let candidates = [
        Some(state.previous_cursor().cloned()),
        Some(state.current_cursor().cloned()),
        state.next_cursor().cloned().map(Some),
    ];

    let mut keys: Vec<PageKey> = Vec::with_capacity(candidates.len());
    for cursor in candidates.into_iter().flatten() {
        let key = PageKey::for_position::<L>(&state.position_at(cursor));
        if !keys.contains(&key) {
            keys.push(key);
        }
    }
    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use leaderboard_core::{Cursor, Milb, MilbSortField, PlayerMilb};

    fn state_on_page_three() -> PaginationState<MilbSortField, PlayerMilb> {
        let mut state = PaginationState::new(MilbSortField::Rank);
        for n in 1..=2 {
            let ticket = state.load_started();
            state.load_succeeded(ticket, Vec::new(), Some(Cursor::new(format!("c{n}"))));
            assert!(state.next());
        }
        let ticket = state.load_started();
        state.load_succeeded(ticket, Vec::new(), Some(Cursor::from("c3")));
        state
    }

    #[test]
    fn first_page_keeps_itself_and_next() {
        let mut state: PaginationState<MilbSortField, PlayerMilb> =
            PaginationState::new(MilbSortField::Rank);
        let ticket = state.load_started();
        state.load_succeeded(ticket, Vec::new(), Some(Cursor::from("c1")));

        let keys = retention_keys::<Milb>(&state);
        let keys: Vec<&str> = keys.iter().map(PageKey::as_str).collect();
        assert_eq!(keys, ["milb_start_sort_rank_asc", "milb_c1_sort_rank_asc"]);
    }

    #[test]
    fn deep_page_keeps_previous_current_next() {
        let keys = retention_keys::<Milb>(&state_on_page_three());
        let keys: Vec<&str> = keys.iter().map(PageKey::as_str).collect();
        assert_eq!(
            keys,
            ["milb_c1_sort_rank_asc", "milb_c2_sort_rank_asc", "milb_c3_sort_rank_asc"]
        );
    }

    #[test]
    fn last_page_keeps_two() {
        let mut state = state_on_page_three();
        assert!(state.next());
        let ticket = state.load_started();
        state.load_succeeded(ticket, Vec::new(), None);
        assert_eq!(retention_keys::<Milb>(&state).len(), 2);
    }
}

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use leaderboard_core::{Cursor, Listing, Position};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::StorageError;
use crate::key::PageKey;
use crate::storage::Storage;

/// Persisted shape of a page-index record.
#[derive(Debug, Serialize, Deserialize)]
struct PageRecord {
    #[serde(rename = "sortedIDs")]
    sorted_ids: Vec<String>,
    #[serde(rename = "nextCursor", default)]
    next_cursor: Option<Cursor>,
}

/// A page served from cache, rows in display order.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedPage<E> {
    /// Rows resolved through the entity map.
    pub entities: Vec<E>,
    /// Cursor of the following page, `None` on the last page.
    pub next_cursor: Option<Cursor>,
}

/// Entity map and page-index records of listing `L` inside shared storage.
///
/// Reads treat absent or undecodable entries as missing. Writes are
/// best-effort: failures are logged and dropped so a full or broken storage
/// degrades to "no caching".
pub struct LocalCache<L, S> {
    storage: Arc<S>,
    _listing: PhantomData<fn() -> L>,
}

impl<L, S> Clone for LocalCache<L, S> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            _listing: PhantomData,
        }
    }
}

impl<L: Listing, S: Storage> LocalCache<L, S> {
    /// Cache view of `L` over a shared storage handle.
    pub const fn new(storage: Arc<S>) -> Self {
        Self {
            storage,
            _listing: PhantomData,
        }
    }

    /// Underlying storage handle.
    pub const fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    /// Every entity fetched so far, keyed by id. Empty when the map is
    /// missing or cannot be decoded.
    pub fn entity_map(&self) -> HashMap<String, L::Entity> {
        let raw = match self.storage.get_item(L::ENTITY_MAP_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return HashMap::new(),
            Err(err) => {
                warn!(key = L::ENTITY_MAP_KEY, %err, "Entity map read failed");
                return HashMap::new();
            }
        };
        decode_entity_map::<L>(&raw)
    }

    /// Upsert `entities` into the entity map by id; the newest copy wins.
    pub fn merge_entities(&self, entities: &[L::Entity]) {
        if let Err(err) = self.try_merge_entities(entities) {
            warn!(key = L::ENTITY_MAP_KEY, %err, "Cache storage failed");
        }
    }

    fn try_merge_entities(&self, entities: &[L::Entity]) -> Result<(), StorageError> {
        self.storage.update(L::ENTITY_MAP_KEY, |current| {
            let mut by_id = current.map_or_else(HashMap::new, decode_entity_map::<L>);
            for entity in entities {
                by_id.insert(L::entity_id(entity).to_owned(), entity.clone());
            }
            Ok(Some(serde_json::to_string(&by_id)?))
        })
    }

    /// Look up a page-index record and resolve its rows.
    ///
    /// Returns `None` when the record is absent, undecodable, or references
    /// an id the entity map no longer holds.
    pub fn page(&self, key: &PageKey) -> Option<CachedPage<L::Entity>> {
        let raw = match self.storage.get_item(key.as_str()) {
            Ok(raw) => raw?,
            Err(err) => {
                warn!(%key, %err, "Page record read failed");
                return None;
            }
        };
        let record: PageRecord = match serde_json::from_str(&raw) {
            Ok(record) => record,
            Err(err) => {
                debug!(%key, %err, "Ignoring undecodable page record");
                return None;
            }
        };

        let mut by_id = self.entity_map();
        let entities: Vec<L::Entity> = record
            .sorted_ids
            .iter()
            .filter_map(|id| by_id.remove(id))
            .collect();
        if entities.len() != record.sorted_ids.len() {
            debug!(%key, "Page record references evicted entities");
            return None;
        }

        Some(CachedPage {
            entities,
            next_cursor: record.next_cursor,
        })
    }

    /// Whether `key` resolves to a complete cached page.
    pub fn contains_page(&self, key: &PageKey) -> bool {
        self.page(key).is_some()
    }

    /// Write (or overwrite) a page-index record.
    pub fn put_page(&self, key: &PageKey, ordered_ids: Vec<String>, next_cursor: Option<Cursor>) {
        if let Err(err) = self.try_put_page(key, ordered_ids, next_cursor) {
            warn!(%key, %err, "Cache storage failed");
        }
    }

    fn try_put_page(
        &self,
        key: &PageKey,
        sorted_ids: Vec<String>,
        next_cursor: Option<Cursor>,
    ) -> Result<(), StorageError> {
        let body = serde_json::to_string(&PageRecord {
            sorted_ids,
            next_cursor,
        })?;
        self.storage.set_item(key.as_str(), &body)
    }

    /// Cache a fetched page: merge its rows into the entity map, then record
    /// their order under the page's key.
    pub fn store_page(
        &self,
        position: &Position<L::SortField>,
        entities: &[L::Entity],
        next_cursor: Option<&Cursor>,
    ) {
        let key = PageKey::for_position::<L>(position);
        let stored = self.try_merge_entities(entities).and_then(|()| {
            let ids = entities.iter().map(|e| L::entity_id(e).to_owned()).collect();
            self.try_put_page(&key, ids, next_cursor.cloned())
        });
        match stored {
            Ok(()) => debug!(%key, rows = entities.len(), "Cached page"),
            Err(err) => warn!(%key, %err, "Cache storage failed"),
        }
    }

    /// Page-index keys currently stored for this listing.
    pub fn page_keys(&self) -> Vec<String> {
        let prefix = PageKey::namespace_prefix(L::NAMESPACE);
        match self.storage.keys() {
            Ok(keys) => keys.into_iter().filter(|k| k.starts_with(&prefix)).collect(),
            Err(err) => {
                warn!(%err, "Listing storage keys failed");
                Vec::new()
            }
        }
    }

    /// Remove every page-index record of this listing whose key is not in
    /// `retain`. Keys of other namespaces and the entity map are untouched.
    /// Returns how many records were removed.
    pub fn evict_except(&self, retain: &[PageKey]) -> usize {
        let mut removed = 0;
        for key in self.page_keys() {
            if retain.iter().any(|kept| kept.as_str() == key) {
                continue;
            }
            match self.storage.remove_item(&key) {
                Ok(()) => removed += 1,
                Err(err) => warn!(%key, %err, "Evicting page record failed"),
            }
        }
        if removed > 0 {
            debug!(namespace = L::NAMESPACE, removed, "Evicted page records");
        }
        removed
    }
}

fn decode_entity_map<L: Listing>(raw: &str) -> HashMap<String, L::Entity> {
    serde_json::from_str(raw).unwrap_or_else(|err| {
        debug!(key = L::ENTITY_MAP_KEY, %err, "Ignoring undecodable entity map");
        HashMap::new()
    })
}

//! Memoization for structured-text parsing.
//!
//! The same coordinate-reference block is typically queried for several
//! sub-fields in one reconciliation, and across calls for the same dataset.
//! Entries are keyed by the BLAKE3 hash of the text, never by request.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use crate::error::VerifyError;
use crate::wkt::{self, ParsedBlock};

pub type ParseOutcome = Result<Arc<ParsedBlock>, VerifyError>;

/// Injected into the resolver. Implementations must parse any given text
/// at most once per cache lifetime, even under concurrent lookups.
pub trait ParseCache: Send + Sync + fmt::Debug {
    fn get_or_parse(&self, text: &str) -> ParseOutcome;

    /// Number of distinct blocks held.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn clear(&self);
}

type Slot = Arc<OnceCell<ParseOutcome>>;

/// Default cache: a locked map of per-key once-cells.
///
/// The map lock is held only long enough to fetch or insert a slot; the
/// parse itself runs under the slot's `OnceCell`, so concurrent callers of
/// the same text block on that one parse while other keys proceed.
#[derive(Default)]
pub struct SharedParseCache {
    slots: Mutex<HashMap<String, Slot>>,
    parses: AtomicUsize,
}

impl SharedParseCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses actually performed (cache misses).
    pub fn parse_count(&self) -> usize {
        self.parses.load(Ordering::Relaxed)
    }

    fn slot(&self, key: String) -> Slot {
        let mut slots = self.slots.lock();
        slots.entry(key).or_default().clone()
    }
}

impl fmt::Debug for SharedParseCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedParseCache")
            .field("entries", &self.slots.lock().len())
            .field("parses", &self.parse_count())
            .finish()
    }
}

impl ParseCache for SharedParseCache {
    fn get_or_parse(&self, text: &str) -> ParseOutcome {
        let key = wkt::content_hash(text);
        let slot = self.slot(key.clone());
        let mut fresh = false;
        let outcome = slot.get_or_init(|| {
            fresh = true;
            self.parses.fetch_add(1, Ordering::Relaxed);
            let parsed = wkt::parse_block(text).map(Arc::new);
            if let Err(e) = &parsed {
                log::warn!("unparseable structured text {}: {e}", &key[..12]);
            }
            parsed
        });
        if !fresh {
            log::trace!("parse cache hit {}", &key[..12]);
        }
        outcome.clone()
    }

    fn len(&self) -> usize {
        self.slots.lock().len()
    }

    fn clear(&self) {
        self.slots.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLOCK: &str = r#"PROJCS["WGS 84 / UTM zone 31N",AUTHORITY["EPSG","32631"]]"#;

    #[test]
    fn parses_once_per_text() {
        let cache = SharedParseCache::new();
        let a = cache.get_or_parse(BLOCK).unwrap();
        let b = cache.get_or_parse(BLOCK).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.parse_count(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(a.fields["epsg_code"], "32631");
    }

    #[test]
    fn failures_are_cached_too() {
        let cache = SharedParseCache::new();
        let bad = r#"PROJCS["broken""#;
        assert!(cache.get_or_parse(bad).is_err());
        assert!(cache.get_or_parse(bad).is_err());
        assert_eq!(cache.parse_count(), 1);
    }

    #[test]
    fn concurrent_lookups_share_one_parse() {
        let cache = Arc::new(SharedParseCache::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        cache.get_or_parse(BLOCK).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(cache.parse_count(), 1);
    }

    #[test]
    fn clear_forgets_entries() {
        let cache = SharedParseCache::new();
        cache.get_or_parse(BLOCK).unwrap();
        cache.clear();
        assert!(cache.is_empty());
        cache.get_or_parse(BLOCK).unwrap();
        assert_eq!(cache.parse_count(), 2);
    }
}

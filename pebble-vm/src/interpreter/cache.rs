//! Inline method cache: a fixed 211-bucket table mapping
//! `(selector, lookup class)` straight to `(defining class, method)`,
//! avoiding a superclass-chain walk on every repeated send (grounded on
//! `original_source/src/interp.c`'s `methodCache`).

use pebble_types::Ref;

use crate::consts::METHOD_CACHE_SIZE;

#[derive(Debug, Clone, Copy)]
struct Entry {
    selector: Ref,
    lookup_class: Ref,
    defining_class: Ref,
    method: Ref,
}

fn bucket(selector: Ref, lookup_class: Ref) -> usize {
    let sum = (selector.raw() as u32).wrapping_add(lookup_class.raw() as u32);
    (sum as usize) % METHOD_CACHE_SIZE
}

/// One direct-mapped slot per hash bucket; a collision simply evicts
/// whatever was cached there before: a cache miss always falls back to a
/// real lookup, so eviction is never incorrect, only a missed
/// optimization.
#[derive(Debug, Clone)]
pub(crate) struct MethodCache {
    entries: Vec<Option<Entry>>,
}

impl MethodCache {
    pub(crate) fn new() -> Self {
        MethodCache {
            entries: vec![None; METHOD_CACHE_SIZE],
        }
    }

    pub(crate) fn probe(&self, selector: Ref, lookup_class: Ref) -> Option<(Ref, Ref)> {
        match self.entries[bucket(selector, lookup_class)] {
            Some(e) if e.selector == selector && e.lookup_class == lookup_class => {
                Some((e.defining_class, e.method))
            }
            _ => None,
        }
    }

    pub(crate) fn install(&mut self, selector: Ref, lookup_class: Ref, defining_class: Ref, method: Ref) {
        let idx = bucket(selector, lookup_class);
        self.entries[idx] = Some(Entry {
            selector,
            lookup_class,
            defining_class,
            method,
        });
    }

    /// `flushCache`: drop whatever single bucket this `(selector, class)`
    /// pair hashes to, called whenever a method dictionary changes so a
    /// stale hit can't shadow the edit.
    ///
    /// `original_source/src/interp.c` computes the probe side with `%
    /// CACHE_SIZE` but its `flush` helper with `/ CACHE_SIZE` — since the
    /// sum being hashed is usually far smaller than `CACHE_SIZE`, integer
    /// division there collapses almost every flush onto bucket 0, which
    /// reads as a transcription slip rather than a deliberate second hash.
    /// This implementation standardizes on `mod 211` for both sides, so
    /// this flush reuses the same `bucket` the probe/install paths use
    /// (see `DESIGN.md`).
    pub(crate) fn flush(&mut self, selector: Ref, lookup_class: Ref) {
        self.entries[bucket(selector, lookup_class)] = None;
    }

    /// Invalidate every entry (used right after loading an image, whose
    /// recovery pass can renumber object-table indices).
    pub(crate) fn clear(&mut self) {
        for e in &mut self.entries {
            *e = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(index: usize) -> Ref {
        Ref::boxed(index).unwrap()
    }

    #[test]
    fn probe_misses_until_an_entry_is_installed() {
        let mut cache = MethodCache::new();
        let selector = r(1);
        let class = r(2);
        assert_eq!(cache.probe(selector, class), None);

        cache.install(selector, class, r(2), r(3));
        assert_eq!(cache.probe(selector, class), Some((r(2), r(3))));
    }

    #[test]
    fn probe_misses_on_a_different_selector_or_class_even_in_the_same_bucket() {
        let mut cache = MethodCache::new();
        let selector = r(1);
        let class = r(2);
        cache.install(selector, class, r(2), r(3));

        assert_eq!(cache.probe(r(9), class), None);
        assert_eq!(cache.probe(selector, r(9)), None);
    }

    #[test]
    fn flush_drops_only_the_one_bucket_the_pair_hashes_to() {
        let mut cache = MethodCache::new();
        let selector = r(1);
        let class = r(2);
        cache.install(selector, class, r(2), r(3));

        // A pair landing in a different bucket survives the flush.
        let other_selector = r(100);
        let other_class = r(200);
        cache.install(other_selector, other_class, r(200), r(300));

        cache.flush(selector, class);
        assert_eq!(cache.probe(selector, class), None);
        assert_eq!(cache.probe(other_selector, other_class), Some((r(200), r(300))));
    }

    #[test]
    fn clear_drops_every_entry() {
        let mut cache = MethodCache::new();
        cache.install(r(1), r(2), r(2), r(3));
        cache.install(r(10), r(20), r(20), r(30));

        cache.clear();
        assert_eq!(cache.probe(r(1), r(2)), None);
        assert_eq!(cache.probe(r(10), r(20)), None);
    }
}

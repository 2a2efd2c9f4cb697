use animeflix_model::CacheEntry;

/// Entries in the order LRU eviction removes them: oldest access first,
/// insertion order breaking ties.
pub(crate) fn eviction_order<'a>(
    entries: impl Iterator<Item = &'a CacheEntry>,
) -> Vec<&'a CacheEntry> {
    let mut ordered: Vec<&CacheEntry> = entries.collect();
    ordered.sort_by_key(|e| (e.last_accessed_ms, e.seq));
    ordered
}

/// How many bytes eviction must free before admitting `incoming`: the whole
/// payload once the budget would overflow, otherwise none.
pub(crate) fn bytes_to_free(current: u64, incoming: u64, max_bytes: u64) -> u64 {
    if current.saturating_add(incoming) > max_bytes {
        incoming
    } else {
        0
    }
}

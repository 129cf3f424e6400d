//! Aggregate-by-key with first-seen initialisation and an explicit merge.

use std::collections::HashMap;
use std::hash::Hash;

/// Fold `items` into one accumulator per key.
///
/// The first item seen for a key creates the accumulator with `init`; every
/// later item with the same key is folded in with `merge`. Keys come back in
/// first-seen order, so the result does not depend on hash iteration order.
pub fn aggregate_by_key<T, K, A, KF, IF, MF>(
    items: impl IntoIterator<Item = T>,
    key: KF,
    init: IF,
    mut merge: MF,
) -> Vec<(K, A)>
where
    K: Eq + Hash + Clone,
    KF: Fn(&T) -> K,
    IF: Fn(&T) -> A,
    MF: FnMut(&mut A, &T),
{
    let mut slots: HashMap<K, usize> = HashMap::new();
    let mut out: Vec<(K, A)> = Vec::new();
    for item in items {
        let k = key(&item);
        match slots.get(&k) {
            Some(&slot) => merge(&mut out[slot].1, &item),
            None => {
                slots.insert(k.clone(), out.len());
                out.push((k, init(&item)));
            }
        }
    }
    out
}

/// Number of occurrences of each key, in first-seen order.
pub fn count_by_key<T, K, KF>(items: impl IntoIterator<Item = T>, key: KF) -> Vec<(K, usize)>
where
    K: Eq + Hash + Clone,
    KF: Fn(&T) -> K,
{
    aggregate_by_key(items, key, |_| 1usize, |count, _| *count += 1)
}

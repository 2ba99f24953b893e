use itertools::Itertools;
use std::hash::Hash;

/// Remove the duplicated elements, keeping the first occurrence of each.
pub fn dedup<T: Eq + Hash + Clone>(items: impl IntoIterator<Item = T>) -> Vec<T> {
    items.into_iter().unique().collect()
}

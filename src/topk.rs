//! Fixed-capacity top/bottom-K selection over a one-pass stream.
//!
//! Memory is O(K) regardless of stream length. Admission is strict: a new value
//! must beat the worst retained value, so ties at the boundary keep the entry
//! that was seen first. The worst entry is found by linear scan, which is the
//! right trade for the small K (≈10-20) used by the reports.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// Which extreme a [`BoundedTopK`] retains.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Selection {
    /// Keep the K largest values.
    Largest,
    /// Keep the K smallest values.
    Smallest,
}

/// Output ordering of [`BoundedTopK::result`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    /// Smallest value first.
    Ascending,
    /// Largest value first.
    Descending,
}

impl Selection {
    /// Natural presentation order: descending for largest-K, ascending for smallest-K.
    pub fn default_order(self) -> SortOrder {
        match self {
            Selection::Largest => SortOrder::Descending,
            Selection::Smallest => SortOrder::Ascending,
        }
    }

    /// True when `candidate` is strictly more extreme than `kept`.
    fn beats<V: PartialOrd>(self, candidate: &V, kept: &V) -> bool {
        match self {
            Selection::Largest => candidate > kept,
            Selection::Smallest => candidate < kept,
        }
    }
}

/// A retained `(identity, value)` pair.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TopKEntry<I, V> {
    /// Identity of the offered item (package id, node id, label, ...).
    pub identity: I,
    /// Value the selection is ranked on.
    pub value: V,
}

impl<I, V> TopKEntry<I, V> {
    /// Convert into a plain tuple.
    pub fn into_pair(self) -> (I, V) {
        (self.identity, self.value)
    }
}

#[derive(Clone, Debug)]
struct Slot<I, V> {
    entry: TopKEntry<I, V>,
    seq: u64,
}

/// Bounded selector of the K most extreme `(identity, value)` pairs.
///
/// Duplicate identities are independent entries; deduplicate upstream if needed.
/// Incomparable values (NaN) are never admitted.
#[derive(Clone, Debug)]
pub struct BoundedTopK<I, V> {
    capacity: usize,
    selection: Selection,
    order: SortOrder,
    slots: Vec<Slot<I, V>>,
    next_seq: u64,
}

impl<I, V: PartialOrd> BoundedTopK<I, V> {
    /// Create a selector keeping at most `capacity` entries.
    pub fn new(capacity: usize, selection: Selection) -> Self {
        Self {
            capacity,
            selection,
            order: selection.default_order(),
            slots: Vec::new(),
            next_seq: 0,
        }
    }

    /// Selector for the `capacity` largest values.
    pub fn largest(capacity: usize) -> Self {
        Self::new(capacity, Selection::Largest)
    }

    /// Selector for the `capacity` smallest values.
    pub fn smallest(capacity: usize) -> Self {
        Self::new(capacity, Selection::Smallest)
    }

    /// Override the ordering used by [`Self::result`].
    pub fn with_order(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }

    /// Maximum number of retained entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of retained entries.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True when nothing is retained.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Offer a pair to the selection.
    ///
    /// Returns the entry that fell out of the selection: the evicted former
    /// worst entry, or the offered pair itself when it was not admitted.
    /// Returns `None` when the offer was admitted without eviction.
    pub fn offer(&mut self, identity: I, value: V) -> Option<TopKEntry<I, V>> {
        let entry = TopKEntry { identity, value };
        if self.capacity == 0 || entry.value.partial_cmp(&entry.value).is_none() {
            return Some(entry);
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        if self.slots.len() < self.capacity {
            self.slots.push(Slot { entry, seq });
            return None;
        }
        let Some(worst) = self.worst_index() else {
            return Some(entry);
        };
        if !self.selection.beats(&entry.value, &self.slots[worst].entry.value) {
            return Some(entry);
        }
        let evicted = std::mem::replace(&mut self.slots[worst], Slot { entry, seq });
        Some(evicted.entry)
    }

    /// Currently worst retained value (the admission threshold once full).
    pub fn threshold(&self) -> Option<&V> {
        self.worst_index().map(|idx| &self.slots[idx].entry.value)
    }

    /// Retained entries in the configured order; ties keep first-seen order.
    pub fn result(&self) -> Vec<TopKEntry<I, V>>
    where
        I: Clone,
        V: Clone,
    {
        self.sorted_slots()
            .into_iter()
            .map(|slot| slot.entry.clone())
            .collect()
    }

    /// Consume the selector and return retained entries in the configured order.
    pub fn into_result(mut self) -> Vec<TopKEntry<I, V>> {
        let order = self.order;
        self.slots.sort_by(|a, b| compare_slots(order, a, b));
        self.slots.into_iter().map(|slot| slot.entry).collect()
    }

    /// Consume the selector and return `(identity, value)` pairs.
    pub fn into_pairs(self) -> Vec<(I, V)> {
        self.into_result()
            .into_iter()
            .map(TopKEntry::into_pair)
            .collect()
    }

    fn sorted_slots(&self) -> Vec<&Slot<I, V>> {
        let mut slots: Vec<&Slot<I, V>> = self.slots.iter().collect();
        slots.sort_by(|a, b| compare_slots(self.order, a, b));
        slots
    }

    /// Index of the entry evicted next: the least extreme value, and among
    /// equal values the most recently admitted one.
    fn worst_index(&self) -> Option<usize> {
        let mut worst: Option<usize> = None;
        for (idx, slot) in self.slots.iter().enumerate() {
            let Some(current) = worst else {
                worst = Some(idx);
                continue;
            };
            let held = &self.slots[current];
            let less_extreme = self.selection.beats(&held.entry.value, &slot.entry.value);
            let tied_later = held.entry.value.partial_cmp(&slot.entry.value)
                == Some(Ordering::Equal)
                && slot.seq > held.seq;
            if less_extreme || tied_later {
                worst = Some(idx);
            }
        }
        worst
    }
}

fn compare_slots<I, V: PartialOrd>(order: SortOrder, a: &Slot<I, V>, b: &Slot<I, V>) -> Ordering {
    let by_value = a
        .entry
        .value
        .partial_cmp(&b.entry.value)
        .unwrap_or(Ordering::Equal);
    let by_value = match order {
        SortOrder::Ascending => by_value,
        SortOrder::Descending => by_value.reverse(),
    };
    by_value.then_with(|| a.seq.cmp(&b.seq))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs<V: Clone + PartialOrd>(topk: &BoundedTopK<&'static str, V>) -> Vec<(&'static str, V)> {
        topk.result().into_iter().map(TopKEntry::into_pair).collect()
    }

    #[test]
    fn largest_three_keeps_extremes_in_descending_order() {
        let mut topk = BoundedTopK::largest(3);
        for (id, value) in [("a", 10), ("b", 5), ("c", 20), ("d", 1), ("e", 15)] {
            topk.offer(id, value);
        }
        assert_eq!(pairs(&topk), vec![("c", 20), ("e", 15), ("a", 10)]);
    }

    #[test]
    fn smallest_selection_orders_ascending() {
        let mut topk = BoundedTopK::smallest(2);
        for (id, value) in [("a", 10), ("b", 5), ("c", 20), ("d", 1)] {
            topk.offer(id, value);
        }
        assert_eq!(pairs(&topk), vec![("d", 1), ("b", 5)]);
        let descending = topk.with_order(SortOrder::Descending);
        assert_eq!(pairs(&descending), vec![("b", 5), ("d", 1)]);
    }

    #[test]
    fn zero_capacity_never_retains() {
        let mut topk = BoundedTopK::largest(0);
        let dropped = topk.offer("a", 1.0);
        assert_eq!(dropped.map(|entry| entry.identity), Some("a"));
        assert!(topk.result().is_empty());
    }

    #[test]
    fn fewer_offers_than_capacity_keeps_all() {
        let mut topk = BoundedTopK::largest(10);
        topk.offer("a", 2.0);
        topk.offer("b", 3.0);
        assert_eq!(pairs(&topk), vec![("b", 3.0), ("a", 2.0)]);
    }

    #[test]
    fn huge_capacity_grows_with_offers() {
        let mut topk = BoundedTopK::<u64, f64>::largest(1 << 40);
        for id in 0..3 {
            assert!(topk.offer(id, id as f64).is_none());
        }
        assert_eq!(topk.len(), 3);
        assert_eq!(topk.capacity(), 1 << 40);
    }

    #[test]
    fn boundary_ties_are_not_admitted() {
        let mut topk = BoundedTopK::largest(2);
        assert!(topk.offer("a", 5).is_none());
        assert!(topk.offer("b", 7).is_none());
        let rejected = topk.offer("c", 5).unwrap();
        assert_eq!(rejected.identity, "c");
        assert_eq!(pairs(&topk), vec![("b", 7), ("a", 5)]);
    }

    #[test]
    fn ties_inside_the_selection_keep_first_seen_order() {
        let mut topk = BoundedTopK::largest(3);
        topk.offer("first", 4);
        topk.offer("second", 4);
        topk.offer("third", 9);
        assert_eq!(pairs(&topk), vec![("third", 9), ("first", 4), ("second", 4)]);
        let evicted = topk.offer("fourth", 6).unwrap();
        assert_eq!(evicted.identity, "second");
    }

    #[test]
    fn duplicate_identities_are_independent() {
        let mut topk = BoundedTopK::largest(3);
        topk.offer("a", 1);
        topk.offer("a", 2);
        assert_eq!(topk.len(), 2);
    }

    #[test]
    fn nan_values_are_rejected() {
        let mut topk = BoundedTopK::largest(3);
        assert!(topk.offer("nan", f64::NAN).is_some());
        topk.offer("x", 1.0);
        assert_eq!(topk.len(), 1);
    }

    #[test]
    fn retained_values_dominate_every_discard() {
        let values = [13, 2, 99, 47, 47, 5, 81, 23, 66, 8, 71, 30, 99, 1, 54];
        let mut topk = BoundedTopK::largest(4);
        let mut discarded = Vec::new();
        for (idx, value) in values.iter().enumerate() {
            if let Some(out) = topk.offer(idx, *value) {
                discarded.push(out.value);
            }
            let kept = topk.result();
            assert_eq!(kept.len(), (idx + 1).min(4));
            let min_kept = kept.iter().map(|entry| entry.value).min().unwrap();
            assert!(discarded.iter().all(|value| *value <= min_kept));
        }
        assert_eq!(topk.threshold(), Some(&71));
        let kept: Vec<i32> = topk.into_pairs().into_iter().map(|(_, v)| v).collect();
        assert_eq!(kept, vec![99, 99, 81, 71]);
    }
}

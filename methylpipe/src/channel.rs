//! Channels between stages.
//!
//! Every edge of the graph is an unbounded crossbeam channel; a channel is
//! finished once every `Sender` clone has been dropped. The helpers here
//! spawn relay threads on the caller's [`std::thread::Scope`], so all of
//! them are joined when the graph's scope ends.

use crossbeam::channel::unbounded;
pub use crossbeam::channel::{Receiver, Sender};
use dashmap::{mapref::entry::Entry, DashMap};

use std::hash::Hash;
use std::thread::Scope;

pub fn channel<T>() -> (Sender<T>, Receiver<T>) {
    unbounded()
}

/// Replicate every item of `input` to `N` independent consumers
pub fn fan_out<'scope, T, const N: usize>(
    scope: &'scope Scope<'scope, '_>,
    input: Receiver<T>,
) -> [Receiver<T>; N]
where
    T: Clone + Send + 'scope,
{
    let lanes: [(Sender<T>, Receiver<T>); N] = std::array::from_fn(|_| channel());
    let senders: Vec<Sender<T>> = lanes.iter().map(|(tx, _)| tx.clone()).collect();

    scope.spawn(move || {
        for item in input.iter() {
            if let Some((last, rest)) = senders.split_last() {
                for tx in rest {
                    // INFO: a consumer that hung up just stops receiving
                    let _ = tx.send(item.clone());
                }
                let _ = last.send(item);
            }
        }
    });

    lanes.map(|(_, rx)| rx)
}

/// One consumer view over many producers; order is kept per source only
pub fn merge<'scope, T>(scope: &'scope Scope<'scope, '_>, sources: Vec<Receiver<T>>) -> Receiver<T>
where
    T: Send + 'scope,
{
    let (tx, rx) = channel();

    for source in sources {
        let tx = tx.clone();
        scope.spawn(move || {
            for item in source.iter() {
                if tx.send(item).is_err() {
                    break;
                }
            }
        });
    }

    rx
}

/// Apply `f` to every item, dropping those mapped to `None`
pub fn filter_map<'scope, T, U, F>(
    scope: &'scope Scope<'scope, '_>,
    input: Receiver<T>,
    f: F,
) -> Receiver<U>
where
    T: Send + 'scope,
    U: Send + 'scope,
    F: Fn(T) -> Option<U> + Send + 'scope,
{
    let (tx, rx) = channel();

    scope.spawn(move || {
        for item in input.iter() {
            if let Some(mapped) = f(item) {
                if tx.send(mapped).is_err() {
                    break;
                }
            }
        }
    });

    rx
}

/// Unpack emitted groups back into single items, group order kept
pub fn flatten<'scope, T>(scope: &'scope Scope<'scope, '_>, input: Receiver<Vec<T>>) -> Receiver<T>
where
    T: Send + 'scope,
{
    let (tx, rx) = channel();

    scope.spawn(move || {
        for item in input.iter().flatten() {
            if tx.send(item).is_err() {
                break;
            }
        }
    });

    rx
}

/// Split a channel in two by a predicate: `(matching, rest)`
pub fn partition<'scope, T, F>(
    scope: &'scope Scope<'scope, '_>,
    input: Receiver<T>,
    predicate: F,
) -> (Receiver<T>, Receiver<T>)
where
    T: Send + 'scope,
    F: Fn(&T) -> bool + Send + 'scope,
{
    let (yes_tx, yes_rx) = channel();
    let (no_tx, no_rx) = channel();

    scope.spawn(move || {
        for item in input.iter() {
            let tx = if predicate(&item) { &yes_tx } else { &no_tx };
            let _ = tx.send(item);
        }
    });

    (yes_rx, no_rx)
}

/// Buffer collecting items per key until `expected` of them are present.
///
/// Each key's buffer is guarded by its dashmap shard lock, so the
/// completeness check and the removal of a finished group are atomic: of
/// several racing pushes on one key exactly one receives the group.
#[derive(Debug)]
pub struct GroupBuffer<K: Eq + Hash, T> {
    groups: DashMap<K, Vec<T>>,
    expected: usize,
}

impl<K: Eq + Hash, T> GroupBuffer<K, T> {
    pub fn new(expected: usize) -> Self {
        Self {
            groups: DashMap::new(),
            expected,
        }
    }

    /// Add an item; returns the group if this item completed it
    pub fn push(&self, key: K, item: T) -> Option<Vec<T>> {
        match self.groups.entry(key) {
            Entry::Occupied(mut entry) => {
                entry.get_mut().push(item);
                if entry.get().len() >= self.expected {
                    Some(entry.remove())
                } else {
                    None
                }
            }
            Entry::Vacant(entry) => {
                if self.expected <= 1 {
                    Some(vec![item])
                } else {
                    entry.insert(vec![item]);
                    None
                }
            }
        }
    }

    /// Number of keys still waiting for members
    pub fn pending(&self) -> usize {
        self.groups.len()
    }

    /// Take every incomplete group out of the buffer
    pub fn drain(self) -> Vec<(K, Vec<T>)> {
        self.groups.into_iter().collect()
    }
}

/// Group items from several producers by key.
///
/// Producers push concurrently into one shared [`GroupBuffer`]; complete
/// groups are emitted as they close. Once every source is exhausted the
/// leftover partial groups are handed to `on_incomplete` and dropped.
pub fn group_by<'scope, K, T, F, G>(
    scope: &'scope Scope<'scope, '_>,
    sources: Vec<Receiver<T>>,
    expected: usize,
    key_of: F,
    on_incomplete: G,
) -> Receiver<Vec<T>>
where
    K: Eq + Hash + Send + Sync + 'scope,
    T: Send + Sync + 'scope,
    F: Fn(&T) -> K + Send + Sync + 'scope,
    G: FnOnce(Vec<(K, Vec<T>)>) + Send + 'scope,
{
    let (tx, rx) = channel();

    scope.spawn(move || {
        let buffer = GroupBuffer::new(expected);

        std::thread::scope(|inner| {
            for source in sources {
                let (buffer, key_of, tx) = (&buffer, &key_of, tx.clone());
                inner.spawn(move || {
                    for item in source.iter() {
                        if let Some(group) = buffer.push(key_of(&item), item) {
                            let _ = tx.send(group);
                        }
                    }
                });
            }
        });
        drop(tx);

        let leftovers = buffer.drain();
        if !leftovers.is_empty() {
            on_incomplete(leftovers);
        }
    });

    rx
}

/// Everything a channel ever carried, or the explicit empty marker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Collected<T> {
    Empty,
    All(Vec<T>),
}

impl<T> Collected<T> {
    pub fn is_empty(&self) -> bool {
        matches!(self, Collected::Empty)
    }

    pub fn into_vec(self) -> Vec<T> {
        match self {
            Collected::Empty => Vec::new(),
            Collected::All(items) => items,
        }
    }
}

/// Block until every producer of `input` is done and return all items
pub fn collect_all<T>(input: Receiver<T>) -> Collected<T> {
    let items: Vec<T> = input.iter().collect();

    if items.is_empty() {
        Collected::Empty
    } else {
        Collected::All(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn completes_a_pair_exactly_once() {
        let buffer = GroupBuffer::new(2);

        assert_eq!(buffer.push("ABC", 1), None);
        assert_eq!(buffer.push("XYZ", 7), None);
        assert_eq!(buffer.push("ABC", 2), Some(vec![1, 2]));
        assert_eq!(buffer.pending(), 1);

        // INFO: a third member opens a fresh group instead of re-emitting
        assert_eq!(buffer.push("ABC", 3), None);
        assert_eq!(buffer.pending(), 2);
    }

    #[test]
    fn racing_pushes_emit_each_group_once() {
        let buffer = GroupBuffer::new(2);
        let emitted = AtomicUsize::new(0);
        let keys = 500;

        std::thread::scope(|s| {
            for _mate in 0..2 {
                s.spawn(|| {
                    for key in 0..keys {
                        if let Some(group) = buffer.push(key, key) {
                            assert_eq!(group.len(), 2);
                            emitted.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                });
            }
        });

        assert_eq!(emitted.load(Ordering::Relaxed), keys);
        assert_eq!(buffer.pending(), 0);
    }

    #[test]
    fn fan_out_reaches_every_consumer() {
        let (tx, rx) = channel();

        let received = std::thread::scope(|s| {
            let outputs: [Receiver<String>; 3] = fan_out(s, rx);
            for value in ["a", "b", "c"] {
                tx.send(value.to_string()).unwrap();
            }
            drop(tx);

            outputs
                .into_iter()
                .map(|rx| rx.iter().collect::<Vec<_>>())
                .collect::<Vec<_>>()
        });

        assert_eq!(received.len(), 3);
        for items in received {
            assert_eq!(items, vec!["a", "b", "c"]);
        }
    }

    #[test]
    fn merge_keeps_order_within_each_source() {
        let (a_tx, a_rx) = channel();
        let (b_tx, b_rx) = channel();

        let merged: Vec<(char, usize)> = std::thread::scope(|s| {
            let merged = merge(s, vec![a_rx, b_rx]);
            for i in 0..50 {
                a_tx.send(('a', i)).unwrap();
                b_tx.send(('b', i)).unwrap();
            }
            drop(a_tx);
            drop(b_tx);
            merged.iter().collect()
        });

        assert_eq!(merged.len(), 100);
        for source in ['a', 'b'] {
            let order: Vec<usize> = merged
                .iter()
                .filter(|(tag, _)| *tag == source)
                .map(|(_, i)| *i)
                .collect();
            assert_eq!(order, (0..50).collect::<Vec<_>>());
        }
    }

    #[test]
    fn group_by_reports_leftovers() {
        let (r1_tx, r1_rx) = channel();
        let (r2_tx, r2_rx) = channel();
        let (left_tx, left_rx) = channel();

        let groups: Vec<Vec<(&str, u8)>> = std::thread::scope(|s| {
            let grouped = group_by(
                s,
                vec![r1_rx, r2_rx],
                2,
                |item: &(&str, u8)| item.0,
                move |leftovers| {
                    for (key, members) in leftovers {
                        left_tx.send((key, members.len())).unwrap();
                    }
                },
            );

            r1_tx.send(("ABC", 1)).unwrap();
            r1_tx.send(("XYZ", 1)).unwrap();
            r2_tx.send(("ABC", 2)).unwrap();
            drop(r1_tx);
            drop(r2_tx);

            grouped.iter().collect()
        });

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].len(), 2);
        assert!(groups[0].iter().all(|(key, _)| *key == "ABC"));
        assert_eq!(left_rx.iter().collect::<Vec<_>>(), vec![("XYZ", 1)]);
    }

    #[test]
    fn collect_all_marks_empty_channels() {
        let (tx, rx) = channel::<u8>();
        drop(tx);
        assert_eq!(collect_all(rx), Collected::Empty);

        let (tx, rx) = channel();
        tx.send(4).unwrap();
        tx.send(2).unwrap();
        drop(tx);
        assert_eq!(collect_all(rx).into_vec(), vec![4, 2]);
    }

    #[test]
    fn partition_splits_by_predicate() {
        let (tx, rx) = channel();

        let (even, odd): (Vec<u32>, Vec<u32>) = std::thread::scope(|s| {
            let (even, odd) = partition(s, rx, |n: &u32| n % 2 == 0);
            for n in 0..6 {
                tx.send(n).unwrap();
            }
            drop(tx);
            (even.iter().collect(), odd.iter().collect())
        });

        assert_eq!(even, vec![0, 2, 4]);
        assert_eq!(odd, vec![1, 3, 5]);
    }

    #[test]
    fn flatten_unpacks_groups() {
        let (tx, rx) = channel();
        tx.send(vec![1, 2, 3]).unwrap();
        tx.send(vec![4]).unwrap();
        drop(tx);

        let items: Vec<i32> = std::thread::scope(|s| flatten(s, rx).iter().collect());

        assert_eq!(items, vec![1, 2, 3, 4]);
    }
}

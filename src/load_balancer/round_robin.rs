//! Round-robin rotation cursor.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::load_balancer::node::Node;

/// Round-robin selector.
/// Stores an internal counter to rotate through nodes.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the next rotation index. Every caller gets a distinct value.
    pub fn advance(&self) -> usize {
        self.counter.fetch_add(1, Ordering::Relaxed)
    }

    /// Number of indices handed out so far.
    pub fn position(&self) -> usize {
        self.counter.load(Ordering::Relaxed)
    }

    /// Pick the next node from `nodes`. The cursor is not advanced for an empty set.
    pub fn next_node(&self, nodes: &[Arc<Node>]) -> Option<(usize, Arc<Node>)> {
        if nodes.is_empty() {
            return None;
        }
        let index = self.advance();
        Some((index, nodes[index % nodes.len()].clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn node(index: usize, id: &str) -> Arc<Node> {
        let url = format!("http://127.0.0.1:{}", 8080 + index).parse().unwrap();
        Arc::new(Node::new(index, id, url))
    }

    #[test]
    fn test_round_robin() {
        let lb = RoundRobin::new();
        let nodes = vec![node(0, "a"), node(1, "b")];

        let (_, s1) = lb.next_node(&nodes).unwrap();
        assert_eq!(s1.id, "a");

        let (_, s2) = lb.next_node(&nodes).unwrap();
        assert_eq!(s2.id, "b");

        let (_, s3) = lb.next_node(&nodes).unwrap();
        assert_eq!(s3.id, "a");
    }

    #[test]
    fn test_cyclic_order_for_pool_sizes() {
        for k in 1..=5 {
            let lb = RoundRobin::new();
            let nodes: Vec<_> = (0..k).map(|i| node(i, &format!("n{}", i))).collect();
            for i in 0..(k * 4) {
                let (index, picked) = lb.next_node(&nodes).unwrap();
                assert_eq!(index, i);
                assert_eq!(picked.index, i % k);
            }
        }
    }

    #[test]
    fn test_empty_set_does_not_advance() {
        let lb = RoundRobin::new();
        assert!(lb.next_node(&[]).is_none());
        assert_eq!(lb.position(), 0);
    }

    #[test]
    fn test_concurrent_indices_are_distinct() {
        let lb = Arc::new(RoundRobin::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let lb = lb.clone();
                std::thread::spawn(move || (0..250).map(|_| lb.advance()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for h in handles {
            for index in h.join().unwrap() {
                assert!(seen.insert(index), "index {} handed out twice", index);
            }
        }
        assert_eq!(seen.len(), 2000);
        assert_eq!(lb.position(), 2000);
    }
}

//! Height-balanced interval tree over closed intervals `[start, end]`.
//!
//! Nodes live in an arena owned by the tree; child and parent links are
//! indices into it. Each node caches the largest `end` of its subtree so
//! range queries can skip subtrees that finish before the query starts.
//! Intervals are ordered by `(start, end)`; equal keys are allowed.

use std::cmp::Ordering;
use std::mem;

/// Index of a node inside the tree. Only valid until the next removal.
pub type NodeId = usize;

#[derive(Debug, Clone)]
struct Node<K, V> {
    start: K,
    end: K,
    max_end: K,
    value: V,
    height: u32,
    left: Option<NodeId>,
    right: Option<NodeId>,
    parent: Option<NodeId>,
}

#[derive(Debug, Clone)]
pub struct IntervalTree<K, V> {
    nodes: Vec<Node<K, V>>,
    root: Option<NodeId>,
}

impl<K, V> Default for IntervalTree<K, V> {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            root: None,
        }
    }
}

impl<K: Ord + Clone, V> IntervalTree<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.root = None;
    }

    pub fn get(&self, id: NodeId) -> Option<(&K, &K, &V)> {
        self.nodes.get(id).map(|n| (&n.start, &n.end, &n.value))
    }

    /// Largest interval end in the tree.
    pub fn max_end(&self) -> Option<&K> {
        self.root.map(|root| &self.nodes[root].max_end)
    }

    pub fn first(&self) -> Option<(&K, &K, &V)> {
        let id = self.leftmost(self.root?);
        self.get(id)
    }

    pub fn last(&self) -> Option<(&K, &K, &V)> {
        let mut id = self.root?;
        while let Some(right) = self.nodes[id].right {
            id = right;
        }
        self.get(id)
    }

    pub fn insert(&mut self, start: K, end: K, value: V) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node {
            max_end: end.clone(),
            start,
            end,
            value,
            height: 1,
            left: None,
            right: None,
            parent: None,
        });

        let Some(mut current) = self.root else {
            self.root = Some(id);
            return id;
        };
        loop {
            let goes_left = self.key_cmp(id, current) == Ordering::Less;
            let child = if goes_left {
                self.nodes[current].left
            } else {
                self.nodes[current].right
            };
            match child {
                Some(next) => current = next,
                None => {
                    if goes_left {
                        self.nodes[current].left = Some(id);
                    } else {
                        self.nodes[current].right = Some(id);
                    }
                    self.nodes[id].parent = Some(current);
                    break;
                }
            }
        }
        self.retrace(Some(current));
        id
    }

    /// Remove a node and return its value. Every other [`NodeId`] may change.
    pub fn remove(&mut self, id: NodeId) -> Option<V> {
        if id >= self.nodes.len() {
            return None;
        }
        let mut target = id;
        if let (Some(_), Some(right)) = (self.nodes[id].left, self.nodes[id].right) {
            // The in-order successor has no left child; move its interval here
            // and unlink the successor instead.
            target = self.leftmost(right);
            self.swap_payload(id, target);
        }

        let node = &self.nodes[target];
        let child = node.left.or(node.right);
        let parent = node.parent;
        if let Some(child) = child {
            self.nodes[child].parent = parent;
        }
        self.replace_child(parent, target, child);
        self.retrace(parent);

        let removed = self.nodes.swap_remove(target);
        if target < self.nodes.len() {
            self.relink_moved(self.nodes.len(), target);
        }
        Some(removed.value)
    }

    /// First node whose interval is exactly `[start, end]` and whose value
    /// satisfies `matches`.
    pub fn find(&self, start: &K, end: &K, mut matches: impl FnMut(&V) -> bool) -> Option<NodeId> {
        let mut current = self.lower_bound(start, end);
        while let Some(id) = current {
            let node = &self.nodes[id];
            if &node.start != start || &node.end != end {
                return None;
            }
            if matches(&node.value) {
                return Some(id);
            }
            current = self.successor(id);
        }
        None
    }

    /// Visits, in key order, every interval intersecting the closed range
    /// `[low, high]`.
    pub fn for_each_overlapping(&self, low: &K, high: &K, mut f: impl FnMut(NodeId, &K, &K, &V)) {
        self.visit_overlapping(self.root, low, high, &mut f);
    }

    pub fn overlapping(&self, low: &K, high: &K) -> Vec<NodeId> {
        let mut ids = Vec::new();
        self.for_each_overlapping(low, high, |id, _, _, _| ids.push(id));
        ids
    }

    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            tree: self,
            next: self.root.map(|root| self.leftmost(root)),
            remaining: self.len(),
        }
    }

    fn visit_overlapping(
        &self,
        node: Option<NodeId>,
        low: &K,
        high: &K,
        f: &mut impl FnMut(NodeId, &K, &K, &V),
    ) {
        let Some(id) = node else {
            return;
        };
        let n = &self.nodes[id];
        if &n.max_end < low {
            return;
        }
        self.visit_overlapping(n.left, low, high, f);
        // Everything to the right starts at or after this node.
        if &n.start > high {
            return;
        }
        if &n.end >= low {
            f(id, &n.start, &n.end, &n.value);
        }
        self.visit_overlapping(n.right, low, high, f);
    }

    fn key_cmp(&self, a: NodeId, b: NodeId) -> Ordering {
        let (a, b) = (&self.nodes[a], &self.nodes[b]);
        a.start.cmp(&b.start).then_with(|| a.end.cmp(&b.end))
    }

    fn lower_bound(&self, start: &K, end: &K) -> Option<NodeId> {
        let mut candidate = None;
        let mut current = self.root;
        while let Some(id) = current {
            let node = &self.nodes[id];
            if (&node.start, &node.end) >= (start, end) {
                candidate = Some(id);
                current = node.left;
            } else {
                current = node.right;
            }
        }
        candidate
    }

    fn leftmost(&self, mut id: NodeId) -> NodeId {
        while let Some(left) = self.nodes[id].left {
            id = left;
        }
        id
    }

    fn successor(&self, id: NodeId) -> Option<NodeId> {
        if let Some(right) = self.nodes[id].right {
            return Some(self.leftmost(right));
        }
        let mut child = id;
        let mut parent = self.nodes[id].parent;
        while let Some(p) = parent {
            if self.nodes[p].left == Some(child) {
                return Some(p);
            }
            child = p;
            parent = self.nodes[p].parent;
        }
        None
    }

    fn height(&self, id: Option<NodeId>) -> u32 {
        id.map_or(0, |id| self.nodes[id].height)
    }

    fn balance_factor(&self, id: NodeId) -> i64 {
        i64::from(self.height(self.nodes[id].left)) - i64::from(self.height(self.nodes[id].right))
    }

    fn update(&mut self, id: NodeId) {
        let (left, right) = (self.nodes[id].left, self.nodes[id].right);
        let height = 1 + self.height(left).max(self.height(right));
        let mut max_end = self.nodes[id].end.clone();
        for child in [left, right].into_iter().flatten() {
            if self.nodes[child].max_end > max_end {
                max_end = self.nodes[child].max_end.clone();
            }
        }
        let node = &mut self.nodes[id];
        node.height = height;
        node.max_end = max_end;
    }

    fn replace_child(&mut self, parent: Option<NodeId>, old: NodeId, new: Option<NodeId>) {
        match parent {
            None => self.root = new,
            Some(p) if self.nodes[p].left == Some(old) => self.nodes[p].left = new,
            Some(p) => self.nodes[p].right = new,
        }
    }

    fn rotate_left(&mut self, x: NodeId) -> NodeId {
        let Some(y) = self.nodes[x].right else {
            return x;
        };
        let inner = self.nodes[y].left;
        self.nodes[x].right = inner;
        if let Some(inner) = inner {
            self.nodes[inner].parent = Some(x);
        }
        let parent = self.nodes[x].parent;
        self.nodes[y].parent = parent;
        self.replace_child(parent, x, Some(y));
        self.nodes[y].left = Some(x);
        self.nodes[x].parent = Some(y);
        self.update(x);
        self.update(y);
        y
    }

    fn rotate_right(&mut self, x: NodeId) -> NodeId {
        let Some(y) = self.nodes[x].left else {
            return x;
        };
        let inner = self.nodes[y].right;
        self.nodes[x].left = inner;
        if let Some(inner) = inner {
            self.nodes[inner].parent = Some(x);
        }
        let parent = self.nodes[x].parent;
        self.nodes[y].parent = parent;
        self.replace_child(parent, x, Some(y));
        self.nodes[y].right = Some(x);
        self.nodes[x].parent = Some(y);
        self.update(x);
        self.update(y);
        y
    }

    /// Restore the AVL property at `id`, returning the subtree's new root.
    fn rebalance(&mut self, id: NodeId) -> NodeId {
        self.update(id);
        let balance = self.balance_factor(id);
        if balance > 1 {
            if let Some(left) = self.nodes[id].left {
                if self.balance_factor(left) < 0 {
                    self.rotate_left(left);
                }
            }
            return self.rotate_right(id);
        }
        if balance < -1 {
            if let Some(right) = self.nodes[id].right {
                if self.balance_factor(right) > 0 {
                    self.rotate_right(right);
                }
            }
            return self.rotate_left(id);
        }
        id
    }

    fn retrace(&mut self, mut current: Option<NodeId>) {
        while let Some(id) = current {
            let subtree_root = self.rebalance(id);
            current = self.nodes[subtree_root].parent;
        }
    }

    fn swap_payload(&mut self, a: NodeId, b: NodeId) {
        if a == b {
            return;
        }
        let (low, high) = (a.min(b), a.max(b));
        let (head, tail) = self.nodes.split_at_mut(high);
        let (x, y) = (&mut head[low], &mut tail[0]);
        mem::swap(&mut x.start, &mut y.start);
        mem::swap(&mut x.end, &mut y.end);
        mem::swap(&mut x.value, &mut y.value);
    }

    /// After `swap_remove`, the node formerly at `from` sits at `to`.
    fn relink_moved(&mut self, from: NodeId, to: NodeId) {
        let parent = self.nodes[to].parent;
        self.replace_child(parent, from, Some(to));
        for child in [self.nodes[to].left, self.nodes[to].right].into_iter().flatten() {
            self.nodes[child].parent = Some(to);
        }
    }

    #[cfg(test)]
    fn check_invariants(&self) {
        fn walk<K: Ord + Clone, V>(
            tree: &IntervalTree<K, V>,
            id: Option<NodeId>,
            parent: Option<NodeId>,
        ) -> (u32, usize) {
            let Some(id) = id else {
                return (0, 0);
            };
            let node = &tree.nodes[id];
            assert_eq!(node.parent, parent, "parent link of node {id}");
            let (lh, lc) = walk(tree, node.left, Some(id));
            let (rh, rc) = walk(tree, node.right, Some(id));
            assert!(lh.abs_diff(rh) <= 1, "unbalanced at node {id}");
            assert_eq!(node.height, 1 + lh.max(rh));
            let mut max_end = node.end.clone();
            for child in [node.left, node.right].into_iter().flatten() {
                max_end = max_end.max(tree.nodes[child].max_end.clone());
            }
            assert!(node.max_end == max_end, "stale max_end at node {id}");
            (node.height, lc + rc + 1)
        }
        let (_, count) = walk(self, self.root, None);
        assert_eq!(count, self.nodes.len());
        let keys: Vec<_> = self.iter().map(|(s, e, _)| (s.clone(), e.clone())).collect();
        assert!(keys.windows(2).all(|w| w[0] <= w[1]), "keys out of order");
    }
}

pub struct Iter<'a, K, V> {
    tree: &'a IntervalTree<K, V>,
    next: Option<NodeId>,
    remaining: usize,
}

impl<'a, K: Ord + Clone, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next?;
        self.next = self.tree.successor(id);
        self.remaining -= 1;
        let node = &self.tree.nodes[id];
        Some((&node.start, &node.end, &node.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K: Ord + Clone, V> ExactSizeIterator for Iter<'_, K, V> {}

impl<'a, K: Ord + Clone, V> IntoIterator for &'a IntervalTree<K, V> {
    type Item = (&'a K, &'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree_of(intervals: &[(i32, i32)]) -> IntervalTree<i32, usize> {
        let mut tree = IntervalTree::new();
        for (i, &(s, e)) in intervals.iter().enumerate() {
            tree.insert(s, e, i);
            tree.check_invariants();
        }
        tree
    }

    #[test]
    fn sorted_insertion_stays_balanced() {
        let intervals: Vec<_> = (0..200).map(|i| (i, i + 3)).collect();
        let tree = tree_of(&intervals);
        assert_eq!(tree.len(), 200);
        // An AVL tree with 200 nodes is at most 1.44 * log2(201) high.
        assert!(tree.height(tree.root) <= 11);
        assert_eq!(tree.max_end(), Some(&202));
    }

    #[test]
    fn iteration_is_ordered_by_start_then_end() {
        let tree = tree_of(&[(5, 9), (1, 4), (5, 6), (0, 10), (5, 6)]);
        let keys: Vec<_> = tree.iter().map(|(s, e, _)| (*s, *e)).collect();
        assert_eq!(keys, vec![(0, 10), (1, 4), (5, 6), (5, 6), (5, 9)]);
        assert_eq!(tree.first().map(|(s, _, _)| *s), Some(0));
        assert_eq!(tree.last().map(|(_, e, _)| *e), Some(9));
    }

    #[test]
    fn overlap_query_is_closed_and_ordered() {
        let tree = tree_of(&[(0, 2), (3, 3), (4, 8), (9, 12), (1, 20)]);
        let found: Vec<_> = tree
            .overlapping(&2, &4)
            .into_iter()
            .map(|id| *tree.get(id).unwrap().2)
            .collect();
        assert_eq!(found, vec![0, 4, 1, 2]);
        assert!(tree.overlapping(&21, &30).is_empty());
        assert_eq!(tree.overlapping(&12, &12).len(), 2);
    }

    #[test]
    fn find_distinguishes_equal_keys_by_value() {
        let tree = tree_of(&[(1, 1), (1, 1), (1, 1), (0, 5)]);
        let id = tree.find(&1, &1, |v| *v == 2).unwrap();
        assert_eq!(tree.get(id).map(|(_, _, v)| *v), Some(2));
        assert!(tree.find(&1, &1, |v| *v == 3).is_none());
        assert!(tree.find(&1, &2, |_| true).is_none());
    }

    #[test]
    fn removal_keeps_invariants() {
        let intervals: Vec<_> = (0..64).map(|i| ((i * 37) % 64, (i * 37) % 64 + i % 5)).collect();
        let mut tree = tree_of(&intervals);
        for value in (0..64).step_by(3) {
            let (s, e) = intervals[value];
            let id = tree.find(&s, &e, |v| *v == value).unwrap();
            assert_eq!(tree.remove(id), Some(value));
            tree.check_invariants();
        }
        assert_eq!(tree.len(), 64 - 22);
        let values: Vec<_> = tree.iter().map(|(_, _, v)| *v).collect();
        assert!(values.iter().all(|v| v % 3 != 0));
        assert_eq!(tree.remove(1000), None);
    }

    #[test]
    fn remove_everything() {
        let mut tree = tree_of(&[(3, 4), (1, 2), (5, 6), (0, 0), (2, 9)]);
        while let Some((s, e, _)) = tree.first() {
            let (s, e) = (*s, *e);
            let id = tree.find(&s, &e, |_| true).unwrap();
            tree.remove(id);
            tree.check_invariants();
        }
        assert!(tree.is_empty());
        assert_eq!(tree.max_end(), None);
    }
}

//! Arena-backed binary search tree
//!
//! Every index is one of these trees. Nodes live in a `Vec`; children and
//! parents are slot numbers, so the parent back-pointers never form an
//! ownership cycle. Removing a node moves the last slot into the freed one
//! and patches the links that pointed at it, keeping the arena dense.
//!
//! The tree is not balanced. Two-child deletion takes the in-order
//! predecessor or successor according to a `ReplacementPolicy`, random by
//! default so repeated deletions do not skew the tree to one side.
//!
//! # Invariants
//!
//! - In-order traversal yields strictly increasing keys per `compare_keys`
//! - Every node's `parent` is the node whose child link points at it
//! - The root has no parent; an empty tree has no root
//! - A unique tree holds exactly one value per key

use std::cmp::Ordering;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::errors::{IndexError, IndexResult};

/// Total order over keys
pub type CompareKeys<K> = Arc<dyn Fn(&K, &K) -> Ordering + Send + Sync>;

/// Identity of stored values, used when deleting one value under a key
pub type CheckValueEquality<V> = Arc<dyn Fn(&V, &V) -> bool + Send + Sync>;

/// How a two-child node picks the node that replaces it
#[derive(Debug)]
pub enum ReplacementPolicy {
    /// Coin flip between predecessor and successor
    Random(StdRng),
    /// Always the in-order predecessor
    AlwaysPredecessor,
    /// Always the in-order successor
    AlwaysSuccessor,
}

impl ReplacementPolicy {
    /// Random policy seeded from the OS
    pub fn random() -> Self {
        ReplacementPolicy::Random(StdRng::from_entropy())
    }

    /// Random policy with a fixed seed
    pub fn seeded(seed: u64) -> Self {
        ReplacementPolicy::Random(StdRng::seed_from_u64(seed))
    }

    fn pick_predecessor(&mut self) -> bool {
        match self {
            ReplacementPolicy::Random(rng) => rng.gen_bool(0.5),
            ReplacementPolicy::AlwaysPredecessor => true,
            ReplacementPolicy::AlwaysSuccessor => false,
        }
    }
}

/// Returned by `insert` on a unique tree when the key is taken
#[derive(Debug, Clone, PartialEq)]
pub struct KeyConflict<K> {
    pub key: K,
}

/// Inclusive and exclusive bounds for `between_bounds`
#[derive(Debug, Clone)]
pub struct RangeQuery<K> {
    pub gt: Option<K>,
    pub gte: Option<K>,
    pub lt: Option<K>,
    pub lte: Option<K>,
}

impl<K> Default for RangeQuery<K> {
    fn default() -> Self {
        Self {
            gt: None,
            gte: None,
            lt: None,
            lte: None,
        }
    }
}

#[derive(Debug)]
struct Node<K, V> {
    key: K,
    values: Vec<V>,
    left: Option<usize>,
    right: Option<usize>,
    parent: Option<usize>,
}

/// Ordered tree mapping each key to the values sharing it
pub struct BinarySearchTree<K, V> {
    nodes: Vec<Node<K, V>>,
    root: Option<usize>,
    unique: bool,
    compare_keys: CompareKeys<K>,
    check_value_equality: CheckValueEquality<V>,
    policy: ReplacementPolicy,
}

impl<K, V: Clone> BinarySearchTree<K, V> {
    /// Creates an empty tree
    pub fn new(
        unique: bool,
        compare_keys: CompareKeys<K>,
        check_value_equality: CheckValueEquality<V>,
        policy: ReplacementPolicy,
    ) -> Self {
        Self {
            nodes: Vec::new(),
            root: None,
            unique,
            compare_keys,
            check_value_equality,
            policy,
        }
    }

    /// Number of distinct keys
    pub fn len_keys(&self) -> usize {
        self.nodes.len()
    }

    /// True when the tree holds no key
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Drops every node
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.root = None;
    }

    fn alloc(&mut self, key: K, value: V, parent: Option<usize>) -> usize {
        self.nodes.push(Node {
            key,
            values: vec![value],
            left: None,
            right: None,
            parent,
        });
        self.nodes.len() - 1
    }

    /// Inserts a value under a key.
    ///
    /// On an existing key the value is appended, or rejected with the key if
    /// the tree is unique.
    pub fn insert(&mut self, key: K, value: V) -> Result<(), KeyConflict<K>> {
        let Some(mut current) = self.root else {
            self.root = Some(self.alloc(key, value, None));
            return Ok(());
        };

        loop {
            let ordering = (self.compare_keys)(&key, &self.nodes[current].key);
            let next = match ordering {
                Ordering::Equal => {
                    if self.unique {
                        return Err(KeyConflict { key });
                    }
                    self.nodes[current].values.push(value);
                    return Ok(());
                }
                Ordering::Less => self.nodes[current].left,
                Ordering::Greater => self.nodes[current].right,
            };

            match next {
                Some(child) => current = child,
                None => {
                    let id = self.alloc(key, value, Some(current));
                    if ordering == Ordering::Less {
                        self.nodes[current].left = Some(id);
                    } else {
                        self.nodes[current].right = Some(id);
                    }
                    return Ok(());
                }
            }
        }
    }

    fn find(&self, key: &K) -> Option<usize> {
        let mut current = self.root;
        while let Some(id) = current {
            current = match (self.compare_keys)(key, &self.nodes[id].key) {
                Ordering::Equal => return Some(id),
                Ordering::Less => self.nodes[id].left,
                Ordering::Greater => self.nodes[id].right,
            };
        }
        None
    }

    /// Values stored under a key
    pub fn search(&self, key: &K) -> Vec<V> {
        self.find(key)
            .map(|id| self.nodes[id].values.clone())
            .unwrap_or_default()
    }

    fn above_lower(&self, query: &RangeQuery<K>, key: &K) -> bool {
        let gt_ok = query
            .gt
            .as_ref()
            .map_or(true, |b| (self.compare_keys)(key, b) == Ordering::Greater);
        let gte_ok = query
            .gte
            .as_ref()
            .map_or(true, |b| (self.compare_keys)(key, b) != Ordering::Less);
        gt_ok && gte_ok
    }

    fn below_upper(&self, query: &RangeQuery<K>, key: &K) -> bool {
        let lt_ok = query
            .lt
            .as_ref()
            .map_or(true, |b| (self.compare_keys)(key, b) == Ordering::Less);
        let lte_ok = query
            .lte
            .as_ref()
            .map_or(true, |b| (self.compare_keys)(key, b) != Ordering::Greater);
        lt_ok && lte_ok
    }

    /// Values whose key falls within the bounds, in key order.
    ///
    /// Subtrees entirely outside the bounds are never visited.
    pub fn between_bounds(&self, query: &RangeQuery<K>) -> Vec<V> {
        let mut out = Vec::new();
        let mut stack = Vec::new();
        let mut cursor = self.root;

        loop {
            while let Some(id) = cursor {
                stack.push(id);
                let node = &self.nodes[id];
                cursor = if self.above_lower(query, &node.key) {
                    node.left
                } else {
                    None
                };
            }

            let Some(id) = stack.pop() else {
                break;
            };
            let node = &self.nodes[id];
            let lower = self.above_lower(query, &node.key);
            let upper = self.below_upper(query, &node.key);
            if lower && upper {
                out.extend(node.values.iter().cloned());
            }
            cursor = if upper { node.right } else { None };
        }

        out
    }

    /// Every value in key order
    pub fn values(&self) -> Vec<V> {
        self.between_bounds(&RangeQuery::default())
    }

    /// Calls `f` on each key and its values, in key order
    pub fn for_each(&self, mut f: impl FnMut(&K, &[V])) {
        for id in self.in_order_ids() {
            let node = &self.nodes[id];
            f(&node.key, &node.values);
        }
    }

    fn in_order_ids(&self) -> Vec<usize> {
        let mut ids = Vec::with_capacity(self.nodes.len());
        let mut stack = Vec::new();
        let mut cursor = self.root;

        loop {
            while let Some(id) = cursor {
                stack.push(id);
                cursor = self.nodes[id].left;
            }
            let Some(id) = stack.pop() else {
                break;
            };
            ids.push(id);
            cursor = self.nodes[id].right;
        }

        ids
    }

    /// Deletes under a key.
    ///
    /// With a value and several values under the key, only that value is
    /// removed. Otherwise the node goes, provided the value (if any) is the
    /// one it holds.
    pub fn delete(&mut self, key: &K, value: Option<&V>) {
        let Some(id) = self.find(key) else {
            return;
        };

        if let Some(value) = value {
            let eq = Arc::clone(&self.check_value_equality);
            let values = &mut self.nodes[id].values;
            if values.len() > 1 {
                values.retain(|v| !eq(v, value));
                return;
            }
            if !values.iter().any(|v| eq(v, value)) {
                return;
            }
        }

        self.remove_node(id);
    }

    fn subtree_max(&self, mut id: usize) -> usize {
        while let Some(right) = self.nodes[id].right {
            id = right;
        }
        id
    }

    fn subtree_min(&self, mut id: usize) -> usize {
        while let Some(left) = self.nodes[id].left {
            id = left;
        }
        id
    }

    fn replace_child(&mut self, parent: Option<usize>, old: usize, new: Option<usize>) {
        match parent {
            None => self.root = new,
            Some(p) => {
                if self.nodes[p].left == Some(old) {
                    self.nodes[p].left = new;
                } else {
                    self.nodes[p].right = new;
                }
            }
        }
    }

    fn remove_node(&mut self, id: usize) {
        let Node {
            left,
            right,
            parent,
            ..
        } = self.nodes[id];

        match (left, right) {
            (Some(l), Some(r)) => {
                let donor = if self.policy.pick_predecessor() {
                    self.subtree_max(l)
                } else {
                    self.subtree_min(r)
                };
                self.swap_payload(id, donor);
                // the donor has at most one child
                self.remove_node(donor);
            }
            (Some(child), None) | (None, Some(child)) => {
                self.replace_child(parent, id, Some(child));
                self.nodes[child].parent = parent;
                self.release(id);
            }
            (None, None) => {
                self.replace_child(parent, id, None);
                self.release(id);
            }
        }
    }

    fn swap_payload(&mut self, a: usize, b: usize) {
        let (lo, hi) = if a < b { (a, b) } else { (b, a) };
        let (head, tail) = self.nodes.split_at_mut(hi);
        let (x, y) = (&mut head[lo], &mut tail[0]);
        std::mem::swap(&mut x.key, &mut y.key);
        std::mem::swap(&mut x.values, &mut y.values);
    }

    /// Frees an unlinked slot by moving the last node into it
    fn release(&mut self, id: usize) {
        let last = self.nodes.len() - 1;
        self.nodes.swap_remove(id);
        if id == last {
            return;
        }

        let Node {
            left,
            right,
            parent,
            ..
        } = self.nodes[id];

        match parent {
            None => self.root = Some(id),
            Some(p) => {
                if self.nodes[p].left == Some(last) {
                    self.nodes[p].left = Some(id);
                } else {
                    self.nodes[p].right = Some(id);
                }
            }
        }
        for child in [left, right].into_iter().flatten() {
            self.nodes[child].parent = Some(id);
        }
    }

    /// Checks that keys come out of an in-order walk strictly increasing
    pub fn check_is_bst(&self) -> IndexResult<()> {
        let ids = self.in_order_ids();
        if ids.len() != self.nodes.len() {
            return Err(IndexError::invariant(format!(
                "{} nodes reachable out of {}",
                ids.len(),
                self.nodes.len()
            )));
        }
        for pair in ids.windows(2) {
            let ordering = (self.compare_keys)(&self.nodes[pair[0]].key, &self.nodes[pair[1]].key);
            if ordering != Ordering::Less {
                return Err(IndexError::invariant(format!(
                    "keys out of order between nodes {} and {}",
                    pair[0], pair[1]
                )));
            }
        }
        Ok(())
    }

    /// Checks that parent links mirror child links
    pub fn check_internal_pointers(&self) -> IndexResult<()> {
        if let Some(root) = self.root {
            if self.nodes[root].parent.is_some() {
                return Err(IndexError::invariant("root has a parent"));
            }
        }
        for (id, node) in self.nodes.iter().enumerate() {
            for child in [node.left, node.right].into_iter().flatten() {
                if self.nodes[child].parent != Some(id) {
                    return Err(IndexError::invariant(format!(
                        "node {} does not point back to parent {}",
                        child, id
                    )));
                }
            }
            if self.unique && node.values.len() != 1 {
                return Err(IndexError::invariant(format!(
                    "unique node {} holds {} values",
                    id,
                    node.values.len()
                )));
            }
        }
        Ok(())
    }
}

//! Tree construction: computes every leaf's proof path in one pass.

use std::marker::PhantomData;

use sha2::digest::Digest;

use super::path::{empty_node, leaf_from_content, parent_element, Path, PathElement};

/// Layer-by-layer tree cache. `node_cache` holds the nodes of the layer
/// currently being folded; each fold distributes the new siblings into the
/// affected leaf paths.
struct TreeCache<D: Digest> {
    leaves: Vec<Path>,
    leave_count: usize,
    node_cache: Vec<Option<PathElement>>,
    node_depths: u32,
    tree_depths: u32,
    hash_size: usize,
    _hash: PhantomData<D>,
}

impl<D: Digest> TreeCache<D> {
    fn new(leaves: &[Vec<u8>]) -> TreeCache<D> {
        let leave_count = leaves.len();
        let mut depths = 0u32;
        while (1usize << depths) < leave_count {
            depths += 1;
        }
        // A single-leaf tree still gets one interior level.
        if depths == 0 {
            depths = 1;
        }
        let mut tc = TreeCache {
            leaves: Vec::with_capacity(leave_count),
            leave_count,
            node_cache: Vec::with_capacity(leave_count),
            node_depths: depths,
            tree_depths: depths,
            hash_size: <D as Digest>::output_size(),
            _hash: PhantomData,
        };
        for (pos, content) in leaves.iter().enumerate() {
            let leaf = leaf_from_content::<D>(content, pos % 2 == 0, depths);
            tc.leaves.push(Path(vec![leaf.clone()]));
            tc.node_cache.push(Some(leaf));
        }
        tc
    }

    fn set_paths(&mut self, start: usize, count: usize, pe: &PathElement) {
        let end = (start + count).min(self.leave_count);
        for path in &mut self.leaves[start.min(self.leave_count)..end] {
            path.0.push(pe.clone());
        }
    }

    fn take_left(&mut self, pos: usize) -> PathElement {
        let node = self.node_cache[pos].take().expect("left node present");
        assert_eq!(
            node.depths, self.node_depths,
            "tainted node cache: left depths mismatch"
        );
        node
    }

    fn take_right(&mut self, pos: usize, left: &PathElement) -> PathElement {
        if pos + 1 < self.node_cache.len() {
            if let Some(node) = self.node_cache[pos + 1].take() {
                assert_eq!(
                    node.depths, self.node_depths,
                    "tainted node cache: right depths mismatch"
                );
                return node;
            }
        }
        empty_node::<D>(!left.is_left, left.is_leaf, left.depths, self.hash_size)
    }

    /// Push each new parent's sibling into the leaf paths of the opposite
    /// subtree.
    fn distribute_paths(&mut self, left: &PathElement, right: &PathElement, write_pos: usize) {
        let new_depths = left.depths - 1;
        let distance = self.tree_depths - new_depths;
        let tree_count = 1usize << distance;
        let subtree_count = tree_count / 2;
        let left_tree_start = write_pos * tree_count;
        let right_tree_start = left_tree_start + subtree_count;
        self.set_paths(left_tree_start, subtree_count, right);
        self.set_paths(right_tree_start, subtree_count, left);
    }

    /// Fold one layer into the next. Returns whether more layers remain.
    fn calc_layer(&mut self) -> bool {
        let mut lpos = 0usize;
        loop {
            let rpos = lpos / 2;
            if lpos >= self.node_cache.len() || self.node_cache[lpos].is_none() {
                break;
            }
            let left = self.take_left(lpos);
            if left.depths == 0 {
                // Root reached: it terminates every path.
                self.set_paths(0, self.leave_count, &left);
                break;
            }
            let right = self.take_right(lpos, &left);
            self.distribute_paths(&left, &right, rpos);
            self.node_cache[rpos] = Some(parent_element::<D>(rpos % 2 == 0, &left, &right));
            lpos += 2;
        }
        if self.node_depths == 0 {
            false
        } else {
            self.node_depths -= 1;
            true
        }
    }
}

/// A balanced merkle tree with all leaves at the same depth.
pub struct MerkleTree<D: Digest> {
    cache: TreeCache<D>,
}

impl<D: Digest> MerkleTree<D> {
    /// Build a tree over the given leaf contents; `None` when empty.
    pub fn new(leaves: &[Vec<u8>]) -> Option<MerkleTree<D>> {
        if leaves.is_empty() {
            return None;
        }
        Some(MerkleTree {
            cache: TreeCache::new(leaves),
        })
    }

    /// Compute and return the proof path of every leaf, in leaf order.
    pub fn paths(mut self) -> Vec<Path> {
        while self.cache.calc_layer() {}
        self.cache.leaves
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sha2::Sha256;

    fn contents(n: usize) -> Vec<Vec<u8>> {
        (0..n as u32).map(|i| i.to_be_bytes().to_vec()).collect()
    }

    #[test]
    fn test_empty_tree() {
        assert!(MerkleTree::<Sha256>::new(&[]).is_none());
    }

    #[test]
    fn test_paths_end_at_common_root() {
        for n in [1usize, 2, 3, 5, 8, 13] {
            let paths = MerkleTree::<Sha256>::new(&contents(n)).unwrap().paths();
            assert_eq!(paths.len(), n);
            let root = paths[0].root().expect("path has root").clone();
            for (i, p) in paths.iter().enumerate() {
                assert!(p.0[0].is_leaf, "leaf first (n={n}, i={i})");
                assert_eq!(p.root().expect("root"), &root, "shared root (n={n}, i={i})");
            }
        }
    }

    #[test]
    fn test_root_depends_on_content_and_order() {
        let a = MerkleTree::<Sha256>::new(&contents(4)).unwrap().paths();
        let mut reversed = contents(4);
        reversed.reverse();
        let b = MerkleTree::<Sha256>::new(&reversed).unwrap().paths();
        assert_ne!(a[0].root().unwrap().hash, b[0].root().unwrap().hash);

        let mut changed = contents(4);
        changed[2][0] ^= 1;
        let c = MerkleTree::<Sha256>::new(&changed).unwrap().paths();
        assert_ne!(a[0].root().unwrap().hash, c[0].root().unwrap().hash);
    }

    #[test]
    fn test_deterministic() {
        let a = MerkleTree::<Sha256>::new(&contents(7)).unwrap().paths();
        let b = MerkleTree::<Sha256>::new(&contents(7)).unwrap().paths();
        assert_eq!(a, b);
    }
}

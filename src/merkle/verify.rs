//! Path verification.
//!
//! Two independent algorithms check the same contract: the path is
//! structurally plausible, the leaf reconstructs from its content, and
//! recombining siblings up the path reproduces the root hash exactly.
//! Both must return identical results on every input and never panic on
//! adversarial paths; impossible intermediate states verify as false.

use sha2::digest::Digest;

use super::path::{empty_node, leaf_from_content, Path, PathElement};

impl Path {
    /// Verifier 1: regenerates each branch upward, synthesizing empty
    /// siblings on demand.
    ///
    /// Empty placeholders are dropped up front; verification re-derives
    /// them, so their stored bytes carry no authority.
    pub fn verify_ascent<D: Digest>(&self, leaf_content: &[u8]) -> bool {
        let p = self.compress();
        if !p.is_plausible() {
            return false;
        }
        if !p.verify_leaf::<D>(leaf_content) {
            return false;
        }
        verify_path_ascent::<D>(&p.0)
    }

    /// Verifier 2: walks an explicit left/right node pair up the path.
    /// Must agree with [`Path::verify_ascent`] on every input.
    pub fn verify_stack<D: Digest>(&self, leaf_content: &[u8]) -> bool {
        let p = self.compress();
        if !p.is_plausible() {
            return false;
        }
        if !p.verify_leaf::<D>(leaf_content) {
            return false;
        }
        verify_path_stack::<D>(&p.0)
    }

    /// Whether the leaf element reconstructs from `leaf_content`.
    pub fn verify_leaf<D: Digest>(&self, leaf_content: &[u8]) -> bool {
        if self.0.len() < 2 {
            return false;
        }
        let leaf = &self.0[0];
        let reconstructed = leaf_from_content::<D>(leaf_content, leaf.is_left, leaf.depths);
        reconstructed.hash == leaf.hash
    }

    /// Structural plausibility: leaf first, root last, at most one
    /// same-depth peer directly after the leaf, and strictly descending
    /// depths in between (empties skipped).
    fn is_plausible(&self) -> bool {
        let e = &self.0;
        if e.len() < 2 {
            return false;
        }
        let mut test = true;
        test = test && e[0].is_leaf;
        test = test && !e[0].is_empty;
        test = test && e[0].depths > 0;
        let r = e.len() - 1;
        test = test && !e[r].is_leaf;
        test = test && e[r].depths == 0;
        test = test && !e[r].is_empty;

        // A sibling leaf may follow the leaf itself, on the other side.
        if test && e[1].depths == e[0].depths {
            test = test && e.len() > 2;
            test = test && e[1].is_leaf;
            test = test && e[0].is_left != e[1].is_left;
        }

        if test {
            let mut depths = e[0].depths;
            let mut i = 1;
            while i < e.len() {
                if e[i].is_empty {
                    i += 1;
                    continue;
                }
                let node_depths = e[i].depths;
                if node_depths >= depths {
                    if !(i == 1 && node_depths == depths) {
                        test = false;
                        break;
                    }
                    i += 1;
                    continue;
                }
                depths = node_depths;
                i += 1;
            }
            test = test && i == e.len();
        }
        test
    }
}

// ── Verifier 1: branch regeneration ─────────────────────────────────────

fn verify_path_ascent<D: Digest>(p: &[PathElement]) -> bool {
    let hash_size = <D as Digest>::output_size();
    let mut pos = 1usize;
    let mut mynode = p[0].clone();
    loop {
        match gen_branch::<D>(p, pos, mynode, hash_size) {
            Some((true, n)) => {
                mynode = n;
                pos += 1;
            }
            Some((false, n)) => {
                mynode = n;
                break;
            }
            None => return false,
        }
    }
    let root = match p.last() {
        Some(r) if !r.is_leaf && r.depths == 0 => r,
        _ => return false,
    };
    root.is_left == mynode.is_left
        && root.is_leaf == mynode.is_leaf
        && root.depths == mynode.depths
        && mynode.depths == 0
        && root.hash == mynode.hash
}

/// Combine `mynode` upward until the next path element's depth is reached
/// (inserting empty siblings for the gap) or the root is produced. Returns
/// `(more, new_node)`; `None` marks an impossible state.
fn gen_branch<D: Digest>(
    p: &[PathElement],
    pos: usize,
    mut mynode: PathElement,
    hash_size: usize,
) -> Option<(bool, PathElement)> {
    if mynode.depths == 0 {
        return Some((false, mynode));
    }
    loop {
        let sibling = next_sibling::<D>(p, pos, &mynode, hash_size)?;
        let (left, right) = if sibling.is_left {
            (sibling, mynode.clone())
        } else {
            (mynode.clone(), sibling)
        };
        let is_left = next_node_is_left(p, pos, mynode.depths - 1)?;
        let mut newnode = PathElement {
            is_leaf: false,
            is_left,
            is_empty: false,
            depths: mynode.depths - 1,
            hash: Vec::new(),
        };
        newnode.calc_hash::<D>(Some(&left.hash), Some(&right.hash));
        if newnode.depths == 0 {
            return Some((true, newnode));
        }
        if newnode.depths == p.get(pos + 1)?.depths {
            return Some((true, newnode));
        }
        mynode = newnode;
    }
}

/// The sibling for `mynode`: the path element at this position when it
/// matches the depth and is not an empty marker, a synthesized empty
/// otherwise.
fn next_sibling<D: Digest>(
    p: &[PathElement],
    pos: usize,
    mynode: &PathElement,
    hash_size: usize,
) -> Option<PathElement> {
    let candidate = p.get(pos)?;
    let sibling = if candidate.depths == mynode.depths && !candidate.is_empty {
        candidate.clone()
    } else {
        empty_node::<D>(!mynode.is_left, mynode.is_leaf, mynode.depths, hash_size)
    };
    if sibling.depths != mynode.depths
        || sibling.is_left == mynode.is_left
        || sibling.is_leaf != mynode.is_leaf
    {
        return None;
    }
    Some(sibling)
}

/// Side of the parent about to be created at `depths`, inferred from the
/// upcoming path elements. An absent same-depth peer means the parent
/// survives as the left child; the root is always left.
fn next_node_is_left(p: &[PathElement], pos: usize, depths: u32) -> Option<bool> {
    let current = p.get(pos)?;
    if current.depths == depths {
        if depths == 0 {
            return Some(true);
        }
        return Some(!p.get(pos + 1)?.is_left);
    }
    if pos >= p.len() - 1 {
        return None;
    }
    let next = p.get(pos + 1)?;
    if next.depths == depths {
        if depths == 0 {
            return Some(true);
        }
        return Some(!next.is_left);
    }
    Some(true)
}

// ── Verifier 2: explicit node pair walk ─────────────────────────────────

fn verify_path_stack<D: Digest>(p: &[PathElement]) -> bool {
    let hash_size = <D as Digest>::output_size();
    if p.len() < 2 {
        return false;
    }
    let first = &p[0];
    let second = &p[1];
    if !first.is_leaf {
        return false;
    }
    if first.depths < second.depths {
        return false;
    }
    if first.depths == second.depths {
        if first.is_left == second.is_left {
            return false;
        }
        if !second.is_leaf {
            return false;
        }
    }
    let mut pos = 1usize;
    let (mut left, mut right): (Option<PathElement>, Option<PathElement>) = if first.is_left {
        (Some(first.clone()), None)
    } else {
        (None, Some(first.clone()))
    };

    let mut depths = first.depths;
    while depths > 0 {
        let Some(current) = p.get(pos) else {
            return false;
        };
        let top = match (&left, &right) {
            (Some(t), None) | (None, Some(t)) => t.clone(),
            _ => return false,
        };
        let next_node = if current.depths > depths {
            return false;
        } else if current.depths == depths {
            if top.is_leaf != current.is_leaf {
                return false;
            }
            if top.is_left == current.is_left {
                return false;
            }
            current.clone()
        } else {
            empty_node::<D>(!top.is_left, top.is_leaf, depths, hash_size)
        };
        let distance = depths - current.depths;
        if next_node.is_left {
            left = Some(next_node);
        } else {
            right = Some(next_node);
        }

        let mut create_is_left = match distance {
            0 => {
                // The current element was consumed as the sibling. The
                // parent's side comes from its own sibling when the next
                // element sits at the parent depth; an absent sibling
                // there means the parent survives as the left child.
                pos += 1;
                let Some(after) = p.get(pos) else {
                    return false;
                };
                if after.depths + 1 == depths {
                    !after.is_left
                } else {
                    true
                }
            }
            // A synthesized sibling below a non-root parent still needs
            // path elements to climb through.
            _ if depths > 1 && pos + 1 >= p.len() => return false,
            1 => !current.is_left,
            _ => true,
        };
        if depths - 1 == 0 {
            create_is_left = true;
        }
        let mut created = PathElement {
            is_leaf: false,
            is_left: create_is_left,
            is_empty: false,
            depths: depths - 1,
            hash: Vec::new(),
        };
        let (Some(l), Some(r)) = (&left, &right) else {
            return false;
        };
        created.calc_hash::<D>(Some(&l.hash), Some(&r.hash));
        if created.is_left {
            left = Some(created);
            right = None;
        } else {
            right = Some(created);
            left = None;
        }
        depths -= 1;
    }

    let Some(root) = p.get(pos) else {
        return false;
    };
    let result = match (&left, &right) {
        (Some(t), None) | (None, Some(t)) => t.clone(),
        _ => return false,
    };
    if root.hash != result.hash {
        return false;
    }
    if root.depths != 0 {
        return false;
    }
    // Nothing may follow the root.
    pos + 1 == p.len()
}

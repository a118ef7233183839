//! Path elements and their hashing and marshalling.

use sha2::digest::Digest;

/// Bytes of node metadata prepended to every node hash:
/// `is_leaf | is_left | is_empty | depths (u32 BE)`.
pub const PREFIX_SIZE: usize = 7;

/// A single node within a proof path. The `hash` field is the full node
/// hash, `prefix ‖ digest`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathElement {
    pub is_leaf: bool,
    pub is_left: bool,
    pub is_empty: bool,
    /// Distance label: 0 at the root, `tree_depths` at the leaves.
    pub depths: u32,
    pub hash: Vec<u8>,
}

impl PathElement {
    pub(crate) fn prefix(&self) -> [u8; PREFIX_SIZE] {
        let mut p = [0u8; PREFIX_SIZE];
        if self.is_leaf {
            p[0] = 0x01;
        }
        if self.is_left {
            p[1] = 0x01;
        }
        if self.is_empty {
            p[2] = 0x01;
        }
        p[3..].copy_from_slice(&self.depths.to_be_bytes());
        p
    }

    /// Compute the node hash from up to two child inputs. The digest input
    /// is `0x00 ‖ left? ‖ 0x00(separator, only with both) ‖ right? ‖ 0x00`;
    /// the element's own prefix is prepended unhashed.
    pub(crate) fn calc_hash<D: Digest>(&mut self, left: Option<&[u8]>, right: Option<&[u8]>) {
        let mut h = D::new();
        h.update([0x00]);
        if let Some(l) = left {
            h.update(l);
        }
        if left.is_some() && right.is_some() {
            h.update([0x00]);
        }
        if let Some(r) = right {
            h.update(r);
        }
        h.update([0x00]);
        let digest = h.finalize();
        let mut out = Vec::with_capacity(PREFIX_SIZE + digest.len());
        out.extend_from_slice(&self.prefix());
        out.extend_from_slice(&digest);
        self.hash = out;
    }

    pub(crate) fn calc_hash_leaf<D: Digest>(&mut self, content: &[u8]) {
        self.calc_hash::<D>(Some(content), None);
    }

    /// Marshalled form: the node hash carries all fields.
    pub fn encode(&self) -> &[u8] {
        &self.hash
    }

    /// Unmarshal one element; `None` on truncation.
    pub fn decode(d: &[u8], hash_size: usize) -> Option<PathElement> {
        let elem_size = PREFIX_SIZE + hash_size;
        if d.len() < elem_size {
            return None;
        }
        let mut depths = [0u8; 4];
        depths.copy_from_slice(&d[3..7]);
        Some(PathElement {
            is_leaf: d[0] == 0x01,
            is_left: d[1] == 0x01,
            is_empty: d[2] == 0x01,
            depths: u32::from_be_bytes(depths),
            hash: d[..elem_size].to_vec(),
        })
    }

    /// The externally published root hash: one more digest pass over the
    /// root node hash.
    pub fn root_hash<D: Digest>(&self) -> Vec<u8> {
        D::digest(&self.hash).to_vec()
    }
}

/// Leaf node over raw content.
pub(crate) fn leaf_from_content<D: Digest>(
    content: &[u8],
    is_left: bool,
    depths: u32,
) -> PathElement {
    let mut pe = PathElement {
        is_leaf: true,
        is_left,
        is_empty: false,
        depths,
        hash: Vec::new(),
    };
    pe.calc_hash_leaf::<D>(content);
    pe
}

/// Placeholder sibling rounding out an odd layer. Hashes a zero string of
/// the digest size.
pub(crate) fn empty_node<D: Digest>(
    is_left: bool,
    is_leaf: bool,
    depths: u32,
    hash_size: usize,
) -> PathElement {
    let mut pe = PathElement {
        is_leaf,
        is_left,
        is_empty: true,
        depths,
        hash: Vec::new(),
    };
    pe.calc_hash_leaf::<D>(&vec![0u8; hash_size]);
    pe
}

/// Interior parent of two same-depth children. Contract: children share a
/// depth greater than zero.
pub(crate) fn parent_element<D: Digest>(
    is_left: bool,
    left: &PathElement,
    right: &PathElement,
) -> PathElement {
    assert_eq!(
        left.depths, right.depths,
        "parent of children at different depths"
    );
    let mut pe = PathElement {
        is_leaf: false,
        is_left,
        is_empty: false,
        depths: left.depths - 1,
        hash: Vec::new(),
    };
    pe.calc_hash::<D>(Some(&left.hash), Some(&right.hash));
    pe
}

/// The proof path for one leaf: the leaf itself, the siblings up the tree,
/// and the root.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Path(pub Vec<PathElement>);

impl Path {
    /// Strip empty placeholders; verification re-synthesizes them.
    pub fn compress(&self) -> Path {
        Path(self.0.iter().filter(|e| !e.is_empty).cloned().collect())
    }

    /// The root element, when the path ends in one.
    pub fn root(&self) -> Option<&PathElement> {
        let last = self.0.last()?;
        if last.is_leaf || last.depths != 0 {
            return None;
        }
        Some(last)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.0.iter().map(|e| e.hash.len()).sum());
        for e in &self.0 {
            out.extend_from_slice(e.encode());
        }
        out
    }

    pub fn decode(d: &[u8], hash_size: usize) -> Option<Path> {
        let elem_size = PREFIX_SIZE + hash_size;
        if elem_size == 0 || d.len() % elem_size != 0 {
            return None;
        }
        let mut out = Vec::with_capacity(d.len() / elem_size);
        for chunk in d.chunks(elem_size) {
            out.push(PathElement::decode(chunk, hash_size)?);
        }
        Some(Path(out))
    }
}

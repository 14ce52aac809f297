//! Signature trie over the node arena.
//!
//! Each depth level consumes one [`TypeClass`] of a [`CallShape`]; the node
//! reached after the last symbol holds the thunk for that shape. Nodes are
//! referred to by [`NodeId`] only. Appending a node may move every node in
//! the arena, so a walk re-reads the current node from its ID after each
//! step instead of keeping a reference.
//!
//! ```text
//!            root (#0)
//!           /    \
//!         I        J
//!        / \        \
//!      I    V        J
//!    [II]  [IV]     [JJ]
//! ```

use smallvec::SmallVec;

use crate::arena::{Arena, Id};
use crate::handle::ThunkHandle;
use crate::shape::{ALPHABET_SIZE, CallShape, TypeClass};

/// Index of a trie node.
pub type NodeId = Id<Node>;

/// The root node, allocated when the trie is built.
pub const ROOT: NodeId = Id::new(0);

/// Child slot value meaning "no child". The root is never anyone's child.
const NO_CHILD: u32 = 0;

// =============================================================================
// Node
// =============================================================================

/// One trie level: a child slot per type class and an optional thunk.
#[derive(Debug, Clone, Default)]
pub struct Node {
    children: [u32; ALPHABET_SIZE],
    thunk: Option<ThunkHandle>,
}

impl Node {
    /// Child reached by `class`, if any.
    #[inline]
    pub fn child(&self, class: TypeClass) -> Option<NodeId> {
        match self.children[class.index()] {
            NO_CHILD => None,
            index => Some(Id::new(index)),
        }
    }

    /// Thunk stored at this node.
    #[inline]
    pub fn thunk(&self) -> Option<&ThunkHandle> {
        self.thunk.as_ref()
    }
}

// =============================================================================
// Signature Trie
// =============================================================================

/// Trie mapping call shapes to thunks.
#[derive(Debug, Clone)]
pub struct SignatureTrie {
    nodes: Arena<Node>,
}

impl SignatureTrie {
    /// Create a trie holding only the root.
    pub fn new() -> Self {
        Self::with_capacity(1)
    }

    /// Create a trie whose arena holds `capacity` nodes before growing.
    pub fn with_capacity(capacity: usize) -> Self {
        let mut nodes = Arena::with_capacity(capacity.max(1));
        let root = nodes.alloc(Node::default());
        debug_assert_eq!(root, ROOT);
        Self { nodes }
    }

    /// The root node.
    #[inline]
    pub fn root(&self) -> NodeId {
        ROOT
    }

    /// Walk `shape` from `root`, extending the path when `create_if_missing`.
    ///
    /// Returns `None` when the path does not exist and creation is off.
    pub fn lookup_or_create(
        &mut self,
        root: NodeId,
        shape: &CallShape,
        create_if_missing: bool,
    ) -> Option<NodeId> {
        if create_if_missing {
            Some(self.insert_path(root, shape))
        } else {
            self.lookup(root, shape)
        }
    }

    /// Walk `shape` from `root` without creating nodes.
    pub fn lookup(&self, root: NodeId, shape: &CallShape) -> Option<NodeId> {
        let mut current = root;
        for &class in shape.symbols() {
            current = self.nodes[current].child(class)?;
        }
        Some(current)
    }

    /// Walk `shape` from `root`, appending any missing nodes.
    pub fn insert_path(&mut self, root: NodeId, shape: &CallShape) -> NodeId {
        let mut current = root;
        for &class in shape.symbols() {
            current = match self.nodes[current].child(class) {
                Some(child) => child,
                None => {
                    let child = self.nodes.alloc(Node::default());
                    // The append may have moved `current`; reach it again by ID.
                    self.nodes[current].children[class.index()] = child.index();
                    child
                }
            };
        }
        current
    }

    /// Thunk stored at `node`.
    #[inline]
    pub fn thunk(&self, node: NodeId) -> Option<&ThunkHandle> {
        self.nodes.get(node).and_then(Node::thunk)
    }

    /// Store `handle` at `node`, returning the thunk it replaces.
    #[inline]
    pub fn set_thunk(&mut self, node: NodeId, handle: ThunkHandle) -> Option<ThunkHandle> {
        self.nodes[node].thunk.replace(handle)
    }

    /// Number of nodes, root included.
    #[inline]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of nodes holding a thunk.
    pub fn thunk_count(&self) -> usize {
        self.nodes.iter().filter(|(_, node)| node.thunk.is_some()).count()
    }

    /// Number of times the arena has grown.
    #[inline]
    pub fn reallocations(&self) -> usize {
        self.nodes.reallocations()
    }

    /// Visit every populated node below `root` in alphabet order, passing
    /// the shape spelled by its path.
    pub fn for_each_thunk(&self, root: NodeId, mut visit: impl FnMut(CallShape, &ThunkHandle)) {
        let mut path: SmallVec<[TypeClass; 16]> = SmallVec::new();
        self.visit_from(root, &mut path, &mut visit);
    }

    fn visit_from(
        &self,
        node: NodeId,
        path: &mut SmallVec<[TypeClass; 16]>,
        visit: &mut impl FnMut(CallShape, &ThunkHandle),
    ) {
        let current = &self.nodes[node];
        if let (Some(handle), Some((&ret, params))) = (current.thunk(), path.split_last()) {
            visit(CallShape::from_parts(params, ret), handle);
        }
        for class in TypeClass::ALL {
            if let Some(child) = current.child(class) {
                path.push(class);
                self.visit_from(child, path, visit);
                path.pop();
            }
        }
    }
}

impl Default for SignatureTrie {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================

//! Flattened, parent-aware view of an element tree.
//!
//! [`flatten`] walks the tree once, depth-first with parents before their
//! children, and stores every element in an arena. Parents are arena indices
//! rather than references, and every entry carries its [`NodePath`] so a
//! caller can drop the borrow and mutate the tree at that position.
//!
//! Arena slot 0 is always the root. Queries never return it as a match, but
//! it is the parent of the root's direct children.

use super::{Element, NodePath, Schema};
use crate::grouping::extension_of;

/// Index into a [`FlatTree`].
pub type NodeId = usize;

/// One element of a flattened tree.
#[derive(Debug, Clone)]
pub struct FlatRef<'a> {
    /// The element itself.
    pub element: &'a Element,
    /// Arena index of the parent; `None` only for the root.
    pub parent: Option<NodeId>,
    /// Child indices from the root to this element.
    pub path: NodePath,
}

/// Arena produced by [`flatten`].
#[derive(Debug, Clone)]
pub struct FlatTree<'a> {
    refs: Vec<FlatRef<'a>>,
}

/// Flattens `root` in depth-first pre-order.
#[must_use]
pub fn flatten(root: &Element) -> FlatTree<'_> {
    let mut refs = vec![FlatRef {
        element: root,
        parent: None,
        path: NodePath::new(),
    }];
    // (element, parent id, path); children pushed in reverse so they pop in order
    let mut stack: Vec<(&Element, NodeId, NodePath)> = root
        .child_elements()
        .rev()
        .map(|(index, child)| (child, FlatTree::ROOT, vec![index]))
        .collect();

    while let Some((element, parent, path)) = stack.pop() {
        let id = refs.len();
        for (index, child) in element.child_elements().rev() {
            let mut child_path = path.clone();
            child_path.push(index);
            stack.push((child, id, child_path));
        }
        refs.push(FlatRef {
            element,
            parent: Some(parent),
            path,
        });
    }

    FlatTree { refs }
}

impl<'a> FlatTree<'a> {
    /// Arena index of the root element.
    pub const ROOT: NodeId = 0;

    /// Entry at `id`.
    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&FlatRef<'a>> {
        self.refs.get(id)
    }

    /// The root entry.
    #[must_use]
    pub fn root(&self) -> &FlatRef<'a> {
        &self.refs[Self::ROOT]
    }

    /// Parent entry of `id`, if any.
    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<&FlatRef<'a>> {
        self.refs.get(id)?.parent.and_then(|parent| self.refs.get(parent))
    }

    /// Every element except the root, in traversal order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &FlatRef<'a>)> {
        self.refs.iter().enumerate().skip(1)
    }

    /// Number of elements, root excluded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.refs.len() - 1
    }

    /// True when the root has no element children.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// First element satisfying `predicate`, in traversal order.
    pub fn find(&self, mut predicate: impl FnMut(&Element) -> bool) -> Option<NodeId> {
        self.iter()
            .find(|(_, flat)| predicate(flat.element))
            .map(|(id, _)| id)
    }

    /// First entry whose include path equals `relative_path`.
    #[must_use]
    pub fn find_entry(&self, schema: &Schema, relative_path: &str) -> Option<NodeId> {
        self.find(|element| schema.include_of(element) == Some(relative_path))
    }

    /// True if an entry for `relative_path` exists anywhere in the tree.
    #[must_use]
    pub fn exists(&self, schema: &Schema, relative_path: &str) -> bool {
        self.find_entry(schema, relative_path).is_some()
    }

    /// Parent of the first entry whose include path has extension `extension`.
    #[must_use]
    pub fn find_container(&self, schema: &Schema, extension: &str) -> Option<NodeId> {
        let entry = self.find(|element| {
            schema
                .include_of(element)
                .is_some_and(|include| !include.is_empty() && extension_of(include) == extension)
        })?;
        self.refs[entry].parent
    }
}

//! Where new entries go.
//!
//! Entries are grouped by file extension: a new path joins the group that
//! already holds the first entry with the same extension, or gets a fresh
//! group appended to the root. Existing siblings are never reordered.

use crate::document::{Element, FlatTree, NodePath, Schema, flatten};

/// Extension of the last path component, dot included, case preserved.
///
/// Empty when the file name has no dot, or only a leading one (`.gitignore`).
#[must_use]
pub fn extension_of(path: &str) -> &str {
    let name = path.rsplit(['/', '\\']).next().unwrap_or(path);
    match name.rfind('.') {
        Some(0) | None => "",
        Some(dot) => &name[dot..],
    }
}

/// Decision for one new entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// Append to the element at this path.
    Existing(NodePath),
    /// Append a new group to the root and put the entry there.
    NewContainer,
}

/// Extension-based grouping over a [`Schema`].
#[derive(Debug, Clone, Copy)]
pub struct GroupingPolicy<'s> {
    schema: &'s Schema,
}

impl<'s> GroupingPolicy<'s> {
    /// Policy writing groups and entries named by `schema`.
    #[must_use]
    pub const fn new(schema: &'s Schema) -> Self {
        Self { schema }
    }

    /// Decides where an entry for `relative_path` belongs.
    #[must_use]
    pub fn place(&self, flat: &FlatTree<'_>, relative_path: &str) -> Placement {
        let extension = extension_of(relative_path);
        flat.find_container(self.schema, extension)
            .and_then(|id| flat.get(id))
            .map_or(Placement::NewContainer, |container| {
                Placement::Existing(container.path.clone())
            })
    }

    /// Adds an entry for `relative_path` under `root` and returns the path of
    /// the group it landed in. Does not check for duplicates.
    pub fn insert(&self, root: &mut Element, relative_path: &str) -> NodePath {
        let placement = self.place(&flatten(root), relative_path);
        let entry = self.schema.entry_for(relative_path);

        if let Placement::Existing(path) = placement
            && let Some(container) = root.element_at_mut(&path)
        {
            container.push(entry);
            return path;
        }

        root.push(self.schema.new_container().with_child(entry));
        vec![root.children().len() - 1]
    }
}

//! In-memory model of a project manifest.
//!
//! A [`Document`] holds exactly one root [`Element`] plus whatever sits around
//! it (XML declaration, comments, processing instructions). Elements are a
//! tagged variant: a leaf has no body at all, a container owns a non-empty,
//! ordered list of [`Node`]s. The helpers on [`Element`] keep that invariant,
//! so a container that loses its last child turns back into a leaf and is
//! written as `<Name/>`.
//!
//! Nodes are addressed by a [`NodePath`]: the child index at each level,
//! starting below the root. The [`navigator`] hands out these paths so the
//! tree can be mutated after a read-only search has finished.

pub mod codec;
pub mod navigator;

use indexmap::IndexMap;

pub use codec::{decode, encode};
pub use navigator::{FlatRef, FlatTree, NodeId, flatten};

/// Attribute map. Keys are unique; iteration follows document order.
pub type Attributes = IndexMap<String, String>;

/// Child indices from the root down to a node. The empty path is the root.
pub type NodePath = Vec<usize>;

/// A parsed manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// `<?xml ...?>` attributes, if the document started with a declaration.
    pub declaration: Option<Attributes>,
    /// Comments, processing instructions and doctype before the root.
    pub prolog: Vec<Node>,
    /// The project root.
    pub root: Element,
    /// Comments and processing instructions after the root.
    pub epilog: Vec<Node>,
}

impl Document {
    /// Wraps a bare root element.
    #[must_use]
    pub fn new(root: Element) -> Self {
        Self {
            declaration: None,
            prolog: Vec::new(),
            root,
            epilog: Vec::new(),
        }
    }
}

/// Anything that can appear inside an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// A nested element.
    Element(Element),
    /// Character data, already unescaped.
    Text(String),
    /// `<![CDATA[...]]>` content, verbatim.
    CData(String),
    /// `<!-- ... -->` content, verbatim.
    Comment(String),
    /// `<?target data?>`
    Instruction {
        /// Instruction target.
        target: String,
        /// Everything after the target, trimmed.
        data: String,
    },
    /// `<!DOCTYPE ...>` body, verbatim.
    Doctype(String),
}

impl Node {
    /// Returns the element if this node is one.
    #[must_use]
    pub const fn as_element(&self) -> Option<&Element> {
        match self {
            Self::Element(element) => Some(element),
            _ => None,
        }
    }

    /// Mutable variant of [`Node::as_element`].
    pub fn as_element_mut(&mut self) -> Option<&mut Element> {
        match self {
            Self::Element(element) => Some(element),
            _ => None,
        }
    }

    /// True for text and CDATA nodes.
    #[must_use]
    pub const fn is_character_data(&self) -> bool {
        matches!(self, Self::Text(_) | Self::CData(_))
    }
}

/// Whether an element has children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementBody {
    /// No children. Serialized self-closing.
    Leaf,
    /// One or more children, in document order.
    Container(Vec<Node>),
}

/// A named node with attributes and an optional body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Tag name, e.g. `Project`, `ItemGroup`, `Content`.
    pub name: String,
    /// Attributes, in document order.
    pub attributes: Attributes,
    body: ElementBody,
}

impl Element {
    /// Creates a leaf element without attributes.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Attributes::new(),
            body: ElementBody::Leaf,
        }
    }

    /// Builder-style attribute setter.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Builder-style child append.
    #[must_use]
    pub fn with_child(mut self, child: impl Into<Node>) -> Self {
        self.push(child);
        self
    }

    /// Builds an element from decoded parts, normalizing an empty child list to a leaf.
    pub(crate) fn from_parts(name: String, attributes: Attributes, children: Vec<Node>) -> Self {
        let body = if children.is_empty() {
            ElementBody::Leaf
        } else {
            ElementBody::Container(children)
        };
        Self {
            name,
            attributes,
            body,
        }
    }

    /// Looks up an attribute value.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// The body discriminator.
    #[must_use]
    pub const fn body(&self) -> &ElementBody {
        &self.body
    }

    /// True if the element has at least one child.
    #[must_use]
    pub const fn is_container(&self) -> bool {
        matches!(self.body, ElementBody::Container(_))
    }

    /// Children in document order; empty for a leaf.
    #[must_use]
    pub fn children(&self) -> &[Node] {
        match &self.body {
            ElementBody::Leaf => &[],
            ElementBody::Container(children) => children,
        }
    }

    /// Iterates the element children with their index in [`Element::children`].
    pub fn child_elements(&self) -> impl DoubleEndedIterator<Item = (usize, &Element)> {
        self.children()
            .iter()
            .enumerate()
            .filter_map(|(index, node)| node.as_element().map(|element| (index, element)))
    }

    /// Appends a child, turning a leaf into a container.
    pub fn push(&mut self, child: impl Into<Node>) {
        match &mut self.body {
            ElementBody::Leaf => self.body = ElementBody::Container(vec![child.into()]),
            ElementBody::Container(children) => children.push(child.into()),
        }
    }

    /// Removes the child at `index`. A container left without children becomes a leaf.
    pub fn remove(&mut self, index: usize) -> Option<Node> {
        let ElementBody::Container(children) = &mut self.body else {
            return None;
        };
        if index >= children.len() {
            return None;
        }
        let removed = children.remove(index);
        if children.is_empty() {
            self.body = ElementBody::Leaf;
        }
        Some(removed)
    }

    /// Resolves `path` to a descendant element (the empty path is `self`).
    #[must_use]
    pub fn element_at(&self, path: &[usize]) -> Option<&Self> {
        path.iter()
            .try_fold(self, |element, &index| element.children().get(index)?.as_element())
    }

    /// Mutable variant of [`Element::element_at`].
    pub fn element_at_mut(&mut self, path: &[usize]) -> Option<&mut Self> {
        let mut current = self;
        for &index in path {
            let ElementBody::Container(children) = &mut current.body else {
                return None;
            };
            current = children.get_mut(index)?.as_element_mut()?;
        }
        Some(current)
    }

    /// Removes the node at `path` from its parent. The root itself cannot be removed.
    pub fn remove_at(&mut self, path: &[usize]) -> Option<Node> {
        let (&index, parent_path) = path.split_last()?;
        self.element_at_mut(parent_path)?.remove(index)
    }
}

impl From<Element> for Node {
    fn from(element: Element) -> Self {
        Self::Element(element)
    }
}

/// Names of the nodes the synchronizer reads and writes. Everything else in
/// the manifest is opaque and passed through untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    /// Group element created for new extensions (`ItemGroup`).
    pub container: String,
    /// Leaf element recording one file (`Content`).
    pub entry: String,
    /// Attribute holding the manifest-relative path (`Include`).
    pub include_attribute: String,
}

impl Default for Schema {
    fn default() -> Self {
        Self {
            container: "ItemGroup".to_string(),
            entry: "Content".to_string(),
            include_attribute: "Include".to_string(),
        }
    }
}

impl Schema {
    /// Returns the include path if `element` is an entry carrying one.
    #[must_use]
    pub fn include_of<'e>(&self, element: &'e Element) -> Option<&'e str> {
        if element.name == self.entry {
            element.attribute(&self.include_attribute)
        } else {
            None
        }
    }

    /// Builds a new entry leaf for `relative_path`.
    #[must_use]
    pub fn entry_for(&self, relative_path: &str) -> Element {
        Element::new(self.entry.as_str()).with_attribute(self.include_attribute.as_str(), relative_path)
    }

    /// Builds a new, empty group.
    #[must_use]
    pub fn new_container(&self) -> Element {
        Element::new(self.container.as_str())
    }
}

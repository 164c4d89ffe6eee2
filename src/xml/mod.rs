//! Arena-backed XML tree shared by both document engines
//!
//! Nodes live in one `Vec` and point at each other by index. Detaching a node
//! only unlinks it from its parent; the slot stays allocated until the tree is
//! dropped. Cloning copies a subtree into fresh slots, so a clone never aliases
//! the fragment it was taken from.

mod parse;
mod write;

pub use parse::XmlError;

/// Index of a node inside an [`XmlTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// Payload of a node
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Synthetic root holding the prolog and the document element
    Document,
    Element {
        name: String,
        attrs: Vec<(String, String)>,
    },
    Text(String),
    /// Comments, processing instructions and doctypes, written back verbatim
    Raw(String),
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// An owned XML document
#[derive(Debug, Clone)]
pub struct XmlTree {
    nodes: Vec<Node>,
    declaration: Option<String>,
}

impl Default for XmlTree {
    fn default() -> Self {
        Self::new()
    }
}

impl XmlTree {
    /// Create an empty tree holding only the document node
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                kind: NodeKind::Document,
                parent: None,
                children: Vec::new(),
            }],
            declaration: None,
        }
    }

    /// Parse a complete XML document
    pub fn parse(bytes: &[u8]) -> Result<Self, XmlError> {
        parse::parse(bytes)
    }

    /// Parse a document given as a string
    pub fn parse_str(source: &str) -> Result<Self, XmlError> {
        parse::parse(source.as_bytes())
    }

    /// Serialize the tree back to bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        write::write(self).into_bytes()
    }

    /// Serialize a single subtree without the declaration
    pub fn node_to_string(&self, id: NodeId) -> String {
        let mut out = String::new();
        write::write_node(self, id, &mut out);
        out
    }

    pub fn document(&self) -> NodeId {
        NodeId(0)
    }

    /// The XML declaration content (`version="1.0" ...`), if the source had one
    pub fn declaration(&self) -> Option<&str> {
        self.declaration.as_deref()
    }

    pub fn set_declaration(&mut self, declaration: impl Into<String>) {
        self.declaration = Some(declaration.into());
    }

    /// The outermost element
    pub fn root_element(&self) -> Option<NodeId> {
        self.child_elements(self.document()).next()
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.0].kind
    }

    /// Qualified element name, `None` for non-element nodes
    pub fn name(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id.0].kind {
            NodeKind::Element { name, .. } => Some(name.as_str()),
            _ => None,
        }
    }

    pub fn is_element(&self, id: NodeId, name: &str) -> bool {
        self.name(id) == Some(name)
    }

    pub fn attr(&self, id: NodeId, key: &str) -> Option<&str> {
        match &self.nodes[id.0].kind {
            NodeKind::Element { attrs, .. } => attrs
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str()),
            _ => None,
        }
    }

    pub fn attrs(&self, id: NodeId) -> &[(String, String)] {
        match &self.nodes[id.0].kind {
            NodeKind::Element { attrs, .. } => attrs,
            _ => &[],
        }
    }

    /// Set an attribute, replacing an existing value in place
    pub fn set_attr(&mut self, id: NodeId, key: &str, value: impl Into<String>) {
        if let NodeKind::Element { attrs, .. } = &mut self.nodes[id.0].kind {
            let value = value.into();
            match attrs.iter_mut().find(|(k, _)| k == key) {
                Some(slot) => slot.1 = value,
                None => attrs.push((key.to_string(), value)),
            }
        }
    }

    pub fn remove_attr(&mut self, id: NodeId, key: &str) {
        if let NodeKind::Element { attrs, .. } = &mut self.nodes[id.0].kind {
            attrs.retain(|(k, _)| k != key);
        }
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    /// Element children in document order
    pub fn child_elements(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes[id.0]
            .children
            .iter()
            .copied()
            .filter(move |c| matches!(self.nodes[c.0].kind, NodeKind::Element { .. }))
    }

    pub fn first_child_named(&self, id: NodeId, name: &str) -> Option<NodeId> {
        self.child_elements(id).find(|c| self.is_element(*c, name))
    }

    pub fn children_named(&self, id: NodeId, name: &str) -> Vec<NodeId> {
        self.child_elements(id)
            .filter(|c| self.is_element(*c, name))
            .collect()
    }

    /// All descendants in pre-order, excluding `id` itself
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.nodes[id.0].children.iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.nodes[next.0].children.iter().rev().copied());
        }
        out
    }

    /// Content of a text node
    pub fn text(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id.0].kind {
            NodeKind::Text(text) => Some(text.as_str()),
            _ => None,
        }
    }

    /// Concatenated text of all descendant text nodes
    pub fn text_content(&self, id: NodeId) -> String {
        self.descendants(id)
            .into_iter()
            .filter_map(|d| self.text(d))
            .collect()
    }

    /// Replace the children of an element with a single text node
    pub fn set_text_content(&mut self, id: NodeId, text: impl Into<String>) {
        for child in self.nodes[id.0].children.clone() {
            self.nodes[child.0].parent = None;
        }
        self.nodes[id.0].children.clear();
        let text = self.create_text(text);
        self.append_child(id, text);
    }

    pub fn create_element(&mut self, name: &str, attrs: &[(&str, &str)]) -> NodeId {
        self.push(NodeKind::Element {
            name: name.to_string(),
            attrs: attrs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        })
    }

    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.push(NodeKind::Text(text.into()))
    }

    fn push(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    /// Append a detached node as the last child of `parent`
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    /// Insert `node` immediately before `reference` under the same parent
    ///
    /// Does nothing when `reference` is detached.
    pub fn insert_before(&mut self, reference: NodeId, node: NodeId) {
        let Some(parent) = self.nodes[reference.0].parent else {
            return;
        };
        self.detach(node);
        let position = self.index_in_parent(reference).unwrap_or(0);
        self.nodes[parent.0].children.insert(position, node);
        self.nodes[node.0].parent = Some(parent);
    }

    /// Unlink a node from its parent
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id.0].parent.take() {
            self.nodes[parent.0].children.retain(|c| *c != id);
        }
    }

    pub fn index_in_parent(&self, id: NodeId) -> Option<usize> {
        let parent = self.nodes[id.0].parent?;
        self.nodes[parent.0].children.iter().position(|c| *c == id)
    }

    /// Whether the node is still reachable from the document node
    pub fn is_attached(&self, id: NodeId) -> bool {
        let mut current = id;
        loop {
            if current == self.document() {
                return true;
            }
            match self.nodes[current.0].parent {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    /// Copy a subtree into fresh nodes; the copy is detached
    pub fn deep_clone(&mut self, id: NodeId) -> NodeId {
        let kind = self.nodes[id.0].kind.clone();
        let copy = self.push(kind);
        for child in self.nodes[id.0].children.clone() {
            let child_copy = self.deep_clone(child);
            self.nodes[child_copy.0].parent = Some(copy);
            self.nodes[copy.0].children.push(child_copy);
        }
        copy
    }

    /// Copy a subtree of another tree into this one; the copy is detached
    pub fn import(&mut self, other: &XmlTree, id: NodeId) -> NodeId {
        let copy = self.push(other.nodes[id.0].kind.clone());
        for child in &other.nodes[id.0].children {
            let child_copy = self.import(other, *child);
            self.nodes[child_copy.0].parent = Some(copy);
            self.nodes[copy.0].children.push(child_copy);
        }
        copy
    }

    /// Parse an XML fragment and import its top-level nodes, detached
    pub fn parse_fragment(&mut self, fragment: &str) -> Result<Vec<NodeId>, XmlError> {
        let parsed = XmlTree::parse_str(fragment)?;
        let top = parsed.children(parsed.document()).to_vec();
        Ok(top.into_iter().map(|n| self.import(&parsed, n)).collect())
    }
}

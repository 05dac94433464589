#![forbid(unsafe_code)]

//! Owned, mutable XML tree.
//!
//! The tree is an arena of nodes indexed by [`NodeId`]. It is built from
//! raw bytes via [`SignableDocument::parse`] (roxmltree does the actual
//! parsing) and then mutated in place: signature placement, SOAP header
//! preparation and level upgrade all insert elements into an existing
//! tree. Namespace declarations are stored on the element that declares
//! them, which is what canonicalization needs to decide what to render.

use sigra_core::{Error, Result};
use std::collections::BTreeMap;

/// Index of a node within its document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A qualified XML name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QName {
    /// Prefix as written in the source ("" for none).
    pub prefix: String,
    /// Local part of the name.
    pub local: String,
    /// Namespace URI ("" for no namespace).
    pub ns_uri: String,
}

impl QName {
    pub fn new(prefix: &str, local: &str, ns_uri: &str) -> Self {
        Self {
            prefix: prefix.to_owned(),
            local: local.to_owned(),
            ns_uri: ns_uri.to_owned(),
        }
    }

    /// Unprefixed name in no namespace.
    pub fn plain(local: &str) -> Self {
        Self::new("", local, "")
    }

    /// The name as written: `prefix:local` or `local`.
    pub fn qualified(&self) -> String {
        if self.prefix.is_empty() {
            self.local.clone()
        } else {
            format!("{}:{}", self.prefix, self.local)
        }
    }
}

/// An element attribute. Namespace declarations are not attributes here;
/// they live in [`ElementData::ns_decls`].
#[derive(Debug, Clone)]
pub struct Attribute {
    pub name: QName,
    pub value: String,
}

/// Payload of an element node.
#[derive(Debug, Clone)]
pub struct ElementData {
    pub name: QName,
    /// Attributes in source/insertion order.
    pub attributes: Vec<Attribute>,
    /// Namespace declarations on this element: (prefix, uri).
    /// An empty uri un-declares the prefix.
    pub ns_decls: Vec<(String, String)>,
}

/// The kind of a tree node.
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// The synthetic document root.
    Document,
    Element(ElementData),
    Text(String),
    Comment(String),
    ProcessingInstruction { target: String, data: String },
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// An owned, mutable XML document. Owned exclusively by one signing
/// operation for its duration.
#[derive(Debug, Clone)]
pub struct SignableDocument {
    nodes: Vec<Node>,
}

impl SignableDocument {
    /// Create an empty document (used for building detached fragments
    /// such as a `ds:Signature` block before placement).
    pub fn empty() -> Self {
        Self {
            nodes: vec![Node {
                kind: NodeKind::Document,
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    /// Parse a document from text.
    pub fn parse(text: &str) -> Result<Self> {
        let opts = roxmltree::ParsingOptions {
            allow_dtd: true,
            ..Default::default()
        };
        let doc = roxmltree::Document::parse_with_options(text, opts)
            .map_err(|e| Error::ParsingFailure(e.to_string()))?;

        let mut out = Self::empty();
        let root = out.root();
        for child in doc.root().children() {
            out.convert_node(child, root, &BTreeMap::new())?;
        }
        Ok(out)
    }

    /// Parse a document from raw bytes (must be UTF-8).
    pub fn parse_bytes(data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data)
            .map_err(|e| Error::ParsingFailure(format!("invalid UTF-8: {e}")))?;
        Self::parse(text)
    }

    fn convert_node(
        &mut self,
        src: roxmltree::Node<'_, '_>,
        parent: NodeId,
        parent_scope: &BTreeMap<String, String>,
    ) -> Result<()> {
        match src.node_type() {
            roxmltree::NodeType::Element => {
                // In-scope namespaces of this element; declarations on the
                // element itself are the entries that differ from the
                // parent's scope.
                let mut scope: BTreeMap<String, String> = BTreeMap::new();
                for ns in src.namespaces() {
                    let prefix = ns.name().unwrap_or("");
                    if prefix == "xml" {
                        continue;
                    }
                    scope.insert(prefix.to_owned(), ns.uri().to_owned());
                }
                let mut ns_decls: Vec<(String, String)> = Vec::new();
                for (prefix, uri) in &scope {
                    if parent_scope.get(prefix) != Some(uri) {
                        ns_decls.push((prefix.clone(), uri.clone()));
                    }
                }
                for prefix in parent_scope.keys() {
                    if !scope.contains_key(prefix) {
                        // Un-declared on this element (xmlns="" or similar).
                        ns_decls.push((prefix.clone(), String::new()));
                    }
                }

                let tag = src.tag_name();
                let ns_uri = tag.namespace().unwrap_or("");
                let prefix = if ns_uri.is_empty() {
                    ""
                } else {
                    src.lookup_prefix(ns_uri).unwrap_or("")
                };
                let name = QName::new(prefix, tag.name(), ns_uri);

                let mut attributes = Vec::new();
                for attr in src.attributes() {
                    let a_ns = attr.namespace().unwrap_or("");
                    let a_prefix = if a_ns.is_empty() {
                        String::new()
                    } else if a_ns == sigra_core::ns::XML {
                        "xml".to_owned()
                    } else {
                        src.lookup_prefix(a_ns).unwrap_or("").to_owned()
                    };
                    attributes.push(Attribute {
                        name: QName::new(&a_prefix, attr.name(), a_ns),
                        value: attr.value().to_owned(),
                    });
                }

                let id = self.push_node(NodeKind::Element(ElementData {
                    name,
                    attributes,
                    ns_decls,
                }));
                self.attach(parent, id);
                for child in src.children() {
                    self.convert_node(child, id, &scope)?;
                }
            }
            roxmltree::NodeType::Text => {
                let text = src.text().unwrap_or("").to_owned();
                let id = self.push_node(NodeKind::Text(text));
                self.attach(parent, id);
            }
            roxmltree::NodeType::Comment => {
                let text = src.text().unwrap_or("").to_owned();
                let id = self.push_node(NodeKind::Comment(text));
                self.attach(parent, id);
            }
            roxmltree::NodeType::PI => {
                let pi = src.pi().ok_or_else(|| {
                    Error::ParsingFailure("processing instruction without target".into())
                })?;
                let id = self.push_node(NodeKind::ProcessingInstruction {
                    target: pi.target.to_owned(),
                    data: pi.value.unwrap_or("").to_owned(),
                });
                self.attach(parent, id);
            }
            roxmltree::NodeType::Root => {}
        }
        Ok(())
    }

    fn push_node(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    fn attach(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    // ── Read access ──────────────────────────────────────────────────

    /// The synthetic document node.
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// The document element, if any.
    pub fn root_element(&self) -> Option<NodeId> {
        self.nodes[0]
            .children
            .iter()
            .copied()
            .find(|id| matches!(self.nodes[id.0].kind, NodeKind::Element(_)))
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.0].kind
    }

    pub fn element(&self, id: NodeId) -> Option<&ElementData> {
        match &self.nodes[id.0].kind {
            NodeKind::Element(e) => Some(e),
            _ => None,
        }
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    /// All nodes of the subtree rooted at `id` in document order,
    /// including `id` itself. Explicit stack, no recursion.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            out.push(n);
            for child in self.nodes[n.0].children.iter().rev() {
                stack.push(*child);
            }
        }
        out
    }

    /// First element in document order matching (namespace, local name).
    pub fn find_element(&self, ns_uri: &str, local: &str) -> Option<NodeId> {
        self.descendants(self.root()).into_iter().find(|id| {
            self.element(*id)
                .is_some_and(|e| e.name.local == local && e.name.ns_uri == ns_uri)
        })
    }

    /// First direct child element matching (namespace, local name).
    pub fn find_child_element(&self, parent: NodeId, ns_uri: &str, local: &str) -> Option<NodeId> {
        self.children(parent).iter().copied().find(|id| {
            self.element(*id)
                .is_some_and(|e| e.name.local == local && e.name.ns_uri == ns_uri)
        })
    }

    /// Value of an unprefixed attribute in no namespace.
    pub fn attribute<'a>(&'a self, id: NodeId, local: &str) -> Option<&'a str> {
        self.element(id)?.attributes.iter().find_map(|a| {
            (a.name.local == local && a.name.ns_uri.is_empty()).then_some(a.value.as_str())
        })
    }

    /// Value of a namespaced attribute.
    pub fn attribute_ns<'a>(&'a self, id: NodeId, ns_uri: &str, local: &str) -> Option<&'a str> {
        self.element(id)?.attributes.iter().find_map(|a| {
            (a.name.local == local && a.name.ns_uri == ns_uri).then_some(a.value.as_str())
        })
    }

    /// Concatenated text content of the subtree.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        for n in self.descendants(id) {
            if let NodeKind::Text(t) = &self.nodes[n.0].kind {
                out.push_str(t);
            }
        }
        out
    }

    /// All in-scope namespace bindings for an element, innermost wins.
    /// The `xml` prefix is implicitly bound and never included.
    pub fn in_scope_namespaces(&self, id: NodeId) -> BTreeMap<String, String> {
        let mut chain = Vec::new();
        let mut current = Some(id);
        while let Some(n) = current {
            if let NodeKind::Element(e) = &self.nodes[n.0].kind {
                chain.push(&e.ns_decls);
            }
            current = self.nodes[n.0].parent;
        }
        let mut result = BTreeMap::new();
        for decls in chain.into_iter().rev() {
            for (prefix, uri) in decls {
                if uri.is_empty() {
                    result.remove(prefix);
                } else {
                    result.insert(prefix.clone(), uri.clone());
                }
            }
        }
        result
    }

    // ── Mutation ─────────────────────────────────────────────────────

    /// Create a detached element node.
    pub fn create_element(&mut self, name: QName) -> NodeId {
        self.push_node(NodeKind::Element(ElementData {
            name,
            attributes: Vec::new(),
            ns_decls: Vec::new(),
        }))
    }

    /// Create a detached text node.
    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.push_node(NodeKind::Text(text.to_owned()))
    }

    /// Append a detached node as the last child of `parent`.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.attach(parent, child);
    }

    /// Insert a detached node as the first child of `parent`.
    pub fn insert_first(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.insert(0, child);
    }

    /// Insert a detached node before `anchor` among `parent`'s children.
    pub fn insert_before(&mut self, parent: NodeId, child: NodeId, anchor: NodeId) -> Result<()> {
        let pos = self.nodes[parent.0]
            .children
            .iter()
            .position(|c| *c == anchor)
            .ok_or_else(|| Error::InvalidInput("insertion anchor is not a child".into()))?;
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.insert(pos, child);
        Ok(())
    }

    /// Detach a node from its parent. The node and its subtree stay in
    /// the arena and can be re-attached elsewhere.
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id.0].parent.take() {
            self.nodes[parent.0].children.retain(|c| *c != id);
        }
    }

    /// Set (or replace) an attribute.
    pub fn set_attribute(&mut self, id: NodeId, name: QName, value: &str) {
        if let NodeKind::Element(e) = &mut self.nodes[id.0].kind {
            if let Some(existing) = e
                .attributes
                .iter_mut()
                .find(|a| a.name.local == name.local && a.name.ns_uri == name.ns_uri)
            {
                existing.value = value.to_owned();
            } else {
                e.attributes.push(Attribute {
                    name,
                    value: value.to_owned(),
                });
            }
        }
    }

    /// Remove an attribute by (namespace, local name).
    pub fn remove_attribute(&mut self, id: NodeId, ns_uri: &str, local: &str) {
        if let NodeKind::Element(e) = &mut self.nodes[id.0].kind {
            e.attributes
                .retain(|a| !(a.name.local == local && a.name.ns_uri == ns_uri));
        }
    }

    /// Declare a namespace on an element.
    pub fn declare_namespace(&mut self, id: NodeId, prefix: &str, uri: &str) {
        if let NodeKind::Element(e) = &mut self.nodes[id.0].kind {
            if let Some(existing) = e.ns_decls.iter_mut().find(|(p, _)| p == prefix) {
                existing.1 = uri.to_owned();
            } else {
                e.ns_decls.push((prefix.to_owned(), uri.to_owned()));
            }
        }
    }

    /// Replace the children of an element with a single text node.
    pub fn set_text(&mut self, id: NodeId, text: &str) {
        let old: Vec<NodeId> = self.nodes[id.0].children.drain(..).collect();
        for c in old {
            self.nodes[c.0].parent = None;
        }
        let t = self.create_text(text);
        self.attach(id, t);
    }

    /// Deep-copy a subtree from another document into this one.
    /// Returns the (detached) copy's root id.
    pub fn import_subtree(&mut self, src: &SignableDocument, src_id: NodeId) -> NodeId {
        let copy = self.push_node(src.nodes[src_id.0].kind.clone());
        let children: Vec<NodeId> = src.nodes[src_id.0].children.clone();
        for child in children {
            let imported = self.import_subtree(src, child);
            self.attach(copy, imported);
        }
        copy
    }
}

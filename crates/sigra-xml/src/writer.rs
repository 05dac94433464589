#![forbid(unsafe_code)]

//! Serialization of a [`SignableDocument`] back to bytes.
//!
//! This is the plain (non-canonical) serializer used for the final
//! response document. It renders namespace declarations and attributes
//! exactly as stored in the tree; canonicalization-sensitive consumers
//! re-canonicalize the relevant subtrees themselves, so this output
//! only has to be well-formed and faithful to the tree.

use crate::document::{NodeId, NodeKind, SignableDocument};

/// Serialize the whole document, with an XML declaration.
pub fn serialize(doc: &SignableDocument) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"<?xml version=\"1.0\" encoding=\"UTF-8\"?>");
    for child in doc.children(doc.root()) {
        write_node(doc, *child, &mut out);
    }
    out
}

/// Serialize a single subtree without an XML declaration.
pub fn serialize_subtree(doc: &SignableDocument, id: NodeId) -> Vec<u8> {
    let mut out = Vec::new();
    write_node(doc, id, &mut out);
    out
}

fn write_node(doc: &SignableDocument, id: NodeId, out: &mut Vec<u8>) {
    match doc.kind(id) {
        NodeKind::Document => {
            for child in doc.children(id) {
                write_node(doc, *child, out);
            }
        }
        NodeKind::Element(e) => {
            let name = e.name.qualified();
            out.push(b'<');
            out.extend_from_slice(name.as_bytes());
            for (prefix, uri) in &e.ns_decls {
                if prefix.is_empty() {
                    out.extend_from_slice(b" xmlns=\"");
                } else {
                    out.extend_from_slice(b" xmlns:");
                    out.extend_from_slice(prefix.as_bytes());
                    out.extend_from_slice(b"=\"");
                }
                out.extend_from_slice(escape_attr(uri).as_bytes());
                out.push(b'"');
            }
            for attr in &e.attributes {
                out.push(b' ');
                out.extend_from_slice(attr.name.qualified().as_bytes());
                out.extend_from_slice(b"=\"");
                out.extend_from_slice(escape_attr(&attr.value).as_bytes());
                out.push(b'"');
            }
            if doc.children(id).is_empty() {
                out.extend_from_slice(b"/>");
            } else {
                out.push(b'>');
                for child in doc.children(id) {
                    write_node(doc, *child, out);
                }
                out.extend_from_slice(b"</");
                out.extend_from_slice(name.as_bytes());
                out.push(b'>');
            }
        }
        NodeKind::Text(t) => out.extend_from_slice(escape_text(t).as_bytes()),
        NodeKind::Comment(t) => {
            out.extend_from_slice(b"<!--");
            out.extend_from_slice(t.as_bytes());
            out.extend_from_slice(b"-->");
        }
        NodeKind::ProcessingInstruction { target, data } => {
            out.extend_from_slice(b"<?");
            out.extend_from_slice(target.as_bytes());
            if !data.is_empty() {
                out.push(b' ');
                out.extend_from_slice(data.as_bytes());
            }
            out.extend_from_slice(b"?>");
        }
    }
}

fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

fn escape_attr(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

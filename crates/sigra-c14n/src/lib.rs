#![forbid(unsafe_code)]

//! Exclusive Canonical XML 1.0 (exc-C14N) for the Sigra signature engine.
//!
//! Algorithm URI: `http://www.w3.org/2001/10/xml-exc-c14n#`
//!
//! Only namespace declarations that are "visibly utilized" within the
//! canonicalized subtree are rendered: the prefix of the element's own
//! tag name, prefixes used by its attributes, and any prefix listed in
//! an InclusiveNamespaces PrefixList. Nothing is inherited ambiguously
//! from ancestors, which is what makes a subtree's canonical bytes
//! stable when the surrounding document changes around it.
//!
//! Comments are never emitted (the engine signs without comments).

use sigra_core::{Error, Result};
use sigra_xml::{NodeId, NodeKind, SignableDocument};
use std::collections::{BTreeMap, HashSet};

/// Canonicalize the subtree rooted at `root` using exclusive C14N.
pub fn canonicalize_subtree(doc: &SignableDocument, root: NodeId) -> Result<Vec<u8>> {
    canonicalize_subtree_with_prefixes(doc, root, &[])
}

/// Canonicalize a subtree with an InclusiveNamespaces PrefixList.
/// `"#default"` in the list stands for the default namespace.
pub fn canonicalize_subtree_with_prefixes(
    doc: &SignableDocument,
    root: NodeId,
    inclusive_prefixes: &[String],
) -> Result<Vec<u8>> {
    let prefixes: HashSet<&str> = inclusive_prefixes.iter().map(|s| s.as_str()).collect();
    let mut output = Vec::new();
    process_node(doc, root, &prefixes, &BTreeMap::new(), &mut output)?;
    Ok(output)
}

fn process_node(
    doc: &SignableDocument,
    id: NodeId,
    inclusive_prefixes: &HashSet<&str>,
    rendered_ns: &BTreeMap<String, String>,
    output: &mut Vec<u8>,
) -> Result<()> {
    match doc.kind(id) {
        NodeKind::Document => {
            for child in doc.children(id) {
                process_node(doc, *child, inclusive_prefixes, rendered_ns, output)?;
            }
        }
        NodeKind::Element(_) => {
            process_element(doc, id, inclusive_prefixes, rendered_ns, output)?;
        }
        NodeKind::Text(text) => {
            push_text(output, text);
        }
        NodeKind::Comment(_) => {}
        NodeKind::ProcessingInstruction { target, data } => {
            output.extend_from_slice(b"<?");
            output.extend_from_slice(target.as_bytes());
            if !data.is_empty() {
                output.push(b' ');
                push_pi_data(output, data);
            }
            output.extend_from_slice(b"?>");
        }
    }
    Ok(())
}

fn process_element(
    doc: &SignableDocument,
    id: NodeId,
    inclusive_prefixes: &HashSet<&str>,
    rendered_ns: &BTreeMap<String, String>,
    output: &mut Vec<u8>,
) -> Result<()> {
    let elem = doc
        .element(id)
        .ok_or_else(|| Error::CanonicalizationFailure("node is not an element".into()))?;

    // Visibly utilized bindings: the element's own prefix plus every
    // prefix used by one of its attributes. The tree records the bound
    // URI next to each name, so an unresolvable prefix shows up as a
    // prefixed name with an empty namespace.
    let mut utilized: BTreeMap<String, String> = BTreeMap::new();
    if !elem.name.prefix.is_empty() && elem.name.ns_uri.is_empty() {
        return Err(Error::CanonicalizationFailure(format!(
            "prefix '{}' is not bound to a namespace",
            elem.name.prefix
        )));
    }
    utilized.insert(elem.name.prefix.clone(), elem.name.ns_uri.clone());

    for attr in &elem.attributes {
        if attr.name.ns_uri == sigra_core::ns::XML {
            continue;
        }
        if !attr.name.ns_uri.is_empty() {
            if attr.name.prefix.is_empty() {
                return Err(Error::CanonicalizationFailure(format!(
                    "namespaced attribute '{}' has no prefix",
                    attr.name.local
                )));
            }
            utilized.insert(attr.name.prefix.clone(), attr.name.ns_uri.clone());
        }
    }

    // InclusiveNamespaces PrefixList entries come from the in-scope
    // bindings of this element.
    if !inclusive_prefixes.is_empty() {
        let in_scope = doc.in_scope_namespaces(id);
        for prefix in inclusive_prefixes {
            let key = if *prefix == "#default" { "" } else { *prefix };
            if let Some(uri) = in_scope.get(key) {
                utilized.insert(key.to_owned(), uri.clone());
            }
        }
    }

    // Render only bindings that differ from what an output ancestor
    // already rendered. `utilized` iterates in prefix order, which is
    // already the canonical declaration order (default namespace has
    // the empty prefix and sorts first).
    let mut ns_decls: Vec<(&str, &str)> = Vec::new();
    for (prefix, uri) in &utilized {
        if prefix == "xml" {
            continue;
        }
        if uri.is_empty() {
            // Default namespace is empty here; re-declare only if an
            // ancestor rendered a non-empty default namespace.
            if prefix.is_empty() && rendered_ns.get("").is_some_and(|prev| !prev.is_empty()) {
                ns_decls.push(("", ""));
            }
        } else if rendered_ns.get(prefix) != Some(uri) {
            ns_decls.push((prefix, uri));
        }
    }

    // Attribute order: unqualified attributes first (empty URI sorts
    // before any non-empty one), then by (namespace URI, local name).
    let mut attrs: Vec<_> = elem.attributes.iter().collect();
    attrs.sort_by(|a, b| {
        (&a.name.ns_uri, &a.name.local).cmp(&(&b.name.ns_uri, &b.name.local))
    });

    let name = elem.name.qualified();
    output.push(b'<');
    output.extend_from_slice(name.as_bytes());
    for &(prefix, uri) in &ns_decls {
        output.extend_from_slice(b" xmlns");
        if !prefix.is_empty() {
            output.push(b':');
            output.extend_from_slice(prefix.as_bytes());
        }
        output.extend_from_slice(b"=\"");
        push_attr_value(output, uri);
        output.push(b'"');
    }
    for attr in &attrs {
        output.push(b' ');
        output.extend_from_slice(attr.name.qualified().as_bytes());
        output.extend_from_slice(b"=\"");
        push_attr_value(output, &attr.value);
        output.push(b'"');
    }
    output.push(b'>');

    let mut child_rendered = rendered_ns.clone();
    for (prefix, uri) in &utilized {
        child_rendered.insert(prefix.clone(), uri.clone());
    }

    for child in doc.children(id) {
        process_node(doc, *child, inclusive_prefixes, &child_rendered, output)?;
    }

    output.extend_from_slice(b"</");
    output.extend_from_slice(name.as_bytes());
    output.push(b'>');
    Ok(())
}

// C14N escaping. Byte-wise: multi-byte UTF-8 sequences contain no
// ASCII values and pass through untouched.

/// Text nodes: `&`, `<`, `>` and `\r` (as a character reference, so a
/// later parse does not fold it into a line ending).
fn push_text(out: &mut Vec<u8>, s: &str) {
    for b in s.bytes() {
        match b {
            b'&' => out.extend_from_slice(b"&amp;"),
            b'<' => out.extend_from_slice(b"&lt;"),
            b'>' => out.extend_from_slice(b"&gt;"),
            b'\r' => out.extend_from_slice(b"&#xD;"),
            _ => out.push(b),
        }
    }
}

/// Attribute values: additionally `"` and the whitespace characters a
/// parser would normalize away.
fn push_attr_value(out: &mut Vec<u8>, s: &str) {
    for b in s.bytes() {
        match b {
            b'&' => out.extend_from_slice(b"&amp;"),
            b'<' => out.extend_from_slice(b"&lt;"),
            b'"' => out.extend_from_slice(b"&quot;"),
            b'\t' => out.extend_from_slice(b"&#x9;"),
            b'\n' => out.extend_from_slice(b"&#xA;"),
            b'\r' => out.extend_from_slice(b"&#xD;"),
            _ => out.push(b),
        }
    }
}

/// Processing instruction data: only `\r` needs a reference.
fn push_pi_data(out: &mut Vec<u8>, s: &str) {
    for b in s.bytes() {
        match b {
            b'\r' => out.extend_from_slice(b"&#xD;"),
            _ => out.push(b),
        }
    }
}

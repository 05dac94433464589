#![forbid(unsafe_code)]

//! Identifier resolution.
//!
//! Signed references point at elements by identifier. Two attribute
//! conventions are recognized: a plain `Id` attribute and the namespaced
//! `wsu:Id` used by WS-Security tokens. The index is built once per
//! document per signing operation, and construction fails if any
//! identifier value is carried by more than one element — resolving an
//! ambiguous identifier would open the door to signature wrapping, so
//! the engine fails closed instead of picking a match.

use crate::document::{NodeId, SignableDocument};
use sigra_core::{ns, Error, Result};
use std::collections::HashMap;

/// Identifier → element index for one document.
#[derive(Debug)]
pub struct IdIndex {
    map: HashMap<String, NodeId>,
}

impl IdIndex {
    /// Build the index over the whole tree.
    ///
    /// Fails with [`Error::ReferenceAmbiguous`] if the same identifier
    /// value appears on two elements, under either convention.
    pub fn build(doc: &SignableDocument) -> Result<Self> {
        let mut map: HashMap<String, NodeId> = HashMap::new();
        for id in doc.descendants(doc.root()) {
            if doc.element(id).is_none() {
                continue;
            }
            let mut found: Vec<&str> = Vec::new();
            if let Some(v) = doc.attribute(id, ns::attr::ID) {
                found.push(v);
            }
            if let Some(v) = doc.attribute_ns(id, ns::WSU, ns::attr::ID) {
                found.push(v);
            }
            for value in found {
                if map.insert(value.to_owned(), id).is_some() {
                    return Err(Error::ReferenceAmbiguous(value.to_owned()));
                }
            }
        }
        log::debug!("id index built with {} entries", map.len());
        Ok(Self { map })
    }

    /// Resolve an identifier to its unique element.
    pub fn resolve(&self, id: &str) -> Result<NodeId> {
        self.map
            .get(id)
            .copied()
            .ok_or_else(|| Error::ReferenceNotFound(id.to_owned()))
    }

    /// Number of indexed identifiers.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_plain_and_wsu_ids() {
        let xml = r#"<root xmlns:wsu="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd">
            <a Id="T1"/>
            <b wsu:Id="X509-1"/>
        </root>"#;
        let doc = SignableDocument::parse(xml).unwrap();
        let index = IdIndex::build(&doc).unwrap();
        assert_eq!(index.len(), 2);

        let a = index.resolve("T1").unwrap();
        assert_eq!(doc.element(a).unwrap().name.local, "a");
        let b = index.resolve("X509-1").unwrap();
        assert_eq!(doc.element(b).unwrap().name.local, "b");
    }

    #[test]
    fn missing_id_is_reference_not_found() {
        let doc = SignableDocument::parse("<root><a Id=\"T1\"/></root>").unwrap();
        let index = IdIndex::build(&doc).unwrap();
        assert!(matches!(
            index.resolve("nope"),
            Err(Error::ReferenceNotFound(_))
        ));
    }

    #[test]
    fn duplicate_id_fails_at_build_time() {
        let doc =
            SignableDocument::parse("<root><a Id=\"T1\"/><b Id=\"T1\"/></root>").unwrap();
        assert!(matches!(
            IdIndex::build(&doc),
            Err(Error::ReferenceAmbiguous(_))
        ));
    }

    #[test]
    fn resolution_is_idempotent() {
        let doc = SignableDocument::parse("<root><a Id=\"T1\"/></root>").unwrap();
        let index = IdIndex::build(&doc).unwrap();
        let first = index.resolve("T1").unwrap();
        let second = index.resolve("T1").unwrap();
        assert_eq!(first, second);
    }
}

#![forbid(unsafe_code)]

//! Signature placement.
//!
//! Placement runs after signing. The anchor element and the occupancy
//! rule come from the placement profile, never from document content,
//! so a crafted document cannot redirect where its signature lands.
//! None of the digested subtrees are touched here; only the anchor's
//! child list changes.

use sigra_core::{ns, Error, Result};
use sigra_xml::{NodeId, SignableDocument};

/// Where the signature element is attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlacementAnchor {
    /// Appended as the last child of the document element.
    DocumentRootAppend,
    /// First child of the `wsse:Security` header block.
    SecurityHeaderFirst,
    /// Inserted before the first sibling matching (namespace, local)
    /// under the document element.
    BeforeSibling { ns_uri: String, local: String },
}

/// How many signatures the anchor may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occupancy {
    /// Exactly one signature. With `overwrite` the existing one is
    /// replaced; without it an occupied anchor is an error.
    Single { overwrite: bool },
    /// Multiple signatures accumulate in placement order.
    Append,
}

/// A placement profile: anchor plus occupancy rule.
#[derive(Debug, Clone)]
pub struct PlacementProfile {
    pub anchor: PlacementAnchor,
    pub occupancy: Occupancy,
}

impl PlacementProfile {
    /// WS-Security: single signature, first inside `wsse:Security`.
    pub fn ws_security() -> Self {
        Self {
            anchor: PlacementAnchor::SecurityHeaderFirst,
            occupancy: Occupancy::Single { overwrite: false },
        }
    }

    /// Enveloped XAdES: signatures accumulate at the document root.
    pub fn enveloped() -> Self {
        Self {
            anchor: PlacementAnchor::DocumentRootAppend,
            occupancy: Occupancy::Append,
        }
    }

    /// Place a signature fragment into `doc` under this profile.
    /// Returns the id of the placed signature element.
    pub fn place(
        &self,
        doc: &mut SignableDocument,
        fragment: &SignableDocument,
        fragment_root: NodeId,
    ) -> Result<NodeId> {
        let anchor = self.locate_anchor(doc)?;

        let existing: Vec<NodeId> = doc
            .children(anchor)
            .iter()
            .copied()
            .filter(|c| {
                doc.element(*c)
                    .map(|e| e.name.ns_uri == ns::DSIG && e.name.local == ns::node::SIGNATURE)
                    .unwrap_or(false)
            })
            .collect();

        match self.occupancy {
            Occupancy::Single { overwrite: false } if !existing.is_empty() => {
                return Err(Error::InvalidInput(
                    "placement anchor already holds a signature".into(),
                ));
            }
            Occupancy::Single { overwrite: true } => {
                for sig in &existing {
                    log::warn!("replacing existing signature at placement anchor");
                    doc.detach(*sig);
                }
            }
            _ => {}
        }

        let imported = doc.import_subtree(fragment, fragment_root);
        match &self.anchor {
            PlacementAnchor::SecurityHeaderFirst => doc.insert_first(anchor, imported),
            PlacementAnchor::DocumentRootAppend => doc.append_child(anchor, imported),
            PlacementAnchor::BeforeSibling { ns_uri, local } => {
                match doc.find_child_element(anchor, ns_uri, local) {
                    Some(sibling) => doc.insert_before(anchor, imported, sibling)?,
                    None => doc.append_child(anchor, imported),
                }
            }
        }
        Ok(imported)
    }

    fn locate_anchor(&self, doc: &SignableDocument) -> Result<NodeId> {
        match &self.anchor {
            PlacementAnchor::DocumentRootAppend | PlacementAnchor::BeforeSibling { .. } => doc
                .root_element()
                .ok_or_else(|| Error::InvalidInput("document has no root element".into())),
            PlacementAnchor::SecurityHeaderFirst => doc
                .find_element(ns::WSSE, ns::node::SECURITY)
                .ok_or_else(|| {
                    Error::InvalidInput("document has no wsse:Security header".into())
                }),
        }
    }
}

/// A fixed-size byte reservation for a serialized signature block.
///
/// The reservation size is decided before signing; the signed content
/// commits to it. A finished block that does not fit is a hard error,
/// never a silent re-layout.
#[derive(Debug, Clone, Copy)]
pub struct PlaceholderReservation {
    size: usize,
}

/// Default reservation, sized for a signature block with an embedded
/// certificate chain and revocation data.
pub const DEFAULT_RESERVATION: usize = 8192;

impl PlaceholderReservation {
    pub fn new(size: usize) -> Self {
        Self { size }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Pad `content` with trailing spaces to exactly the reserved size.
    pub fn fill(&self, content: &[u8]) -> Result<Vec<u8>> {
        if content.len() > self.size {
            return Err(Error::SizeOverflow {
                reserved: self.size,
                actual: content.len(),
            });
        }
        let mut out = Vec::with_capacity(self.size);
        out.extend_from_slice(content);
        out.resize(self.size, b' ');
        Ok(out)
    }
}

impl Default for PlaceholderReservation {
    fn default() -> Self {
        Self::new(DEFAULT_RESERVATION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigra_xml::QName;

    const SOAP: &str = concat!(
        r#"<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/">"#,
        r#"<soapenv:Header>"#,
        r#"<wsse:Security xmlns:wsse="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd">"#,
        r#"<wsse:BinarySecurityToken>abc</wsse:BinarySecurityToken>"#,
        r#"</wsse:Security>"#,
        r#"</soapenv:Header>"#,
        r#"<soapenv:Body>x</soapenv:Body>"#,
        r#"</soapenv:Envelope>"#
    );

    fn signature_fragment() -> (SignableDocument, NodeId) {
        let mut doc = SignableDocument::empty();
        let sig = doc.create_element(QName::new("ds", ns::node::SIGNATURE, ns::DSIG));
        doc.declare_namespace(sig, "ds", ns::DSIG);
        let root = doc.root();
        doc.append_child(root, sig);
        (doc, sig)
    }

    #[test]
    fn security_header_first_places_before_token() {
        let mut doc = SignableDocument::parse(SOAP).unwrap();
        let (frag, frag_root) = signature_fragment();
        let placed = PlacementProfile::ws_security()
            .place(&mut doc, &frag, frag_root)
            .unwrap();

        let security = doc.find_element(ns::WSSE, ns::node::SECURITY).unwrap();
        assert_eq!(doc.children(security)[0], placed);
        assert_eq!(doc.children(security).len(), 2);
    }

    #[test]
    fn single_occupancy_rejects_second_signature() {
        let mut doc = SignableDocument::parse(SOAP).unwrap();
        let (frag, frag_root) = signature_fragment();
        let profile = PlacementProfile::ws_security();
        profile.place(&mut doc, &frag, frag_root).unwrap();
        let result = profile.place(&mut doc, &frag, frag_root);
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn single_occupancy_with_overwrite_replaces() {
        let mut doc = SignableDocument::parse(SOAP).unwrap();
        let (frag, frag_root) = signature_fragment();
        let profile = PlacementProfile {
            anchor: PlacementAnchor::SecurityHeaderFirst,
            occupancy: Occupancy::Single { overwrite: true },
        };
        profile.place(&mut doc, &frag, frag_root).unwrap();
        profile.place(&mut doc, &frag, frag_root).unwrap();

        let security = doc.find_element(ns::WSSE, ns::node::SECURITY).unwrap();
        let signatures = doc
            .children(security)
            .iter()
            .filter(|c| {
                doc.element(**c)
                    .map(|e| e.name.local == ns::node::SIGNATURE)
                    .unwrap_or(false)
            })
            .count();
        assert_eq!(signatures, 1);
    }

    #[test]
    fn append_occupancy_accumulates_in_order() {
        let mut doc = SignableDocument::parse("<report>body</report>").unwrap();
        let profile = PlacementProfile::enveloped();
        let (frag, frag_root) = signature_fragment();
        let first = profile.place(&mut doc, &frag, frag_root).unwrap();
        let second = profile.place(&mut doc, &frag, frag_root).unwrap();

        let root = doc.root_element().unwrap();
        let children = doc.children(root);
        let first_pos = children.iter().position(|c| *c == first).unwrap();
        let second_pos = children.iter().position(|c| *c == second).unwrap();
        assert!(first_pos < second_pos);
    }

    #[test]
    fn missing_security_header_is_an_error() {
        let mut doc = SignableDocument::parse("<plain/>").unwrap();
        let (frag, frag_root) = signature_fragment();
        let result = PlacementProfile::ws_security().place(&mut doc, &frag, frag_root);
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn reservation_pads_to_exact_size() {
        let reservation = PlaceholderReservation::new(16);
        let filled = reservation.fill(b"<sig/>").unwrap();
        assert_eq!(filled.len(), 16);
        assert!(filled.starts_with(b"<sig/>"));
        assert!(filled[6..].iter().all(|b| *b == b' '));
    }

    #[test]
    fn reservation_overflow_by_one_byte_fails() {
        let reservation = PlaceholderReservation::new(8);
        let content = vec![b'x'; 9];
        match reservation.fill(&content) {
            Err(Error::SizeOverflow { reserved, actual }) => {
                assert_eq!(reserved, 8);
                assert_eq!(actual, 9);
            }
            other => panic!("expected SizeOverflow, got {:?}", other.map(|v| v.len())),
        }
    }

    #[test]
    fn reservation_exact_fit_succeeds() {
        let reservation = PlaceholderReservation::new(4);
        let filled = reservation.fill(b"abcd").unwrap();
        assert_eq!(filled, b"abcd");
    }
}

#![forbid(unsafe_code)]

//! Embedding validation material into a placed signature.
//!
//! Runs strictly after signing: everything added here lands under
//! UnsignedSignatureProperties, which no reference digests, so the
//! signature stays verifiable. Encapsulated values use line-folded
//! base64 with an explicit DER encoding marker, matching what archive
//! validators expect.

use crate::cache::RevocationArtifacts;
use base64::Engine;
use sigra_core::{ns, Error, Result};
use sigra_xml::{NodeId, QName, SignableDocument};

const FOLD_COLUMN: usize = 76;

/// Base64 with a line break every 76 characters.
pub fn format_base64_folded(data: &[u8]) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(data);
    let mut out = String::with_capacity(encoded.len() + encoded.len() / FOLD_COLUMN + 1);
    for (i, c) in encoded.chars().enumerate() {
        if i > 0 && i % FOLD_COLUMN == 0 {
            out.push('\n');
        }
        out.push(c);
    }
    out
}

/// Embed certificate and revocation values under the signature's
/// UnsignedSignatureProperties, creating the property chain as needed.
///
/// `signature` must be a `ds:Signature` element inside `doc`.
pub fn embed_validation_material(
    doc: &mut SignableDocument,
    signature: NodeId,
    artifacts: &RevocationArtifacts,
) -> Result<()> {
    let is_signature = doc
        .element(signature)
        .map(|e| e.name.ns_uri == ns::DSIG && e.name.local == ns::node::SIGNATURE)
        .unwrap_or(false);
    if !is_signature {
        return Err(Error::InvalidInput(
            "validation material target is not a signature element".into(),
        ));
    }
    if artifacts.is_empty() {
        log::warn!("no validation material to embed, signature level unchanged");
        return Ok(());
    }

    let usp = unsigned_signature_properties(doc, signature)?;

    if !artifacts.certificates.is_empty() {
        let values =
            doc.create_element(QName::new("xades", ns::node::CERTIFICATE_VALUES, ns::XADES));
        doc.append_child(usp, values);
        for der in &artifacts.certificates {
            append_encapsulated(doc, values, ns::node::ENCAPSULATED_X509_CERTIFICATE, der);
        }
    }

    if !artifacts.ocsp_responses.is_empty() || !artifacts.crls.is_empty() {
        let revocation =
            doc.create_element(QName::new("xades", ns::node::REVOCATION_VALUES, ns::XADES));
        doc.append_child(usp, revocation);

        if !artifacts.ocsp_responses.is_empty() {
            let ocsp_values =
                doc.create_element(QName::new("xades", ns::node::OCSP_VALUES, ns::XADES));
            doc.append_child(revocation, ocsp_values);
            for der in &artifacts.ocsp_responses {
                append_encapsulated(doc, ocsp_values, ns::node::ENCAPSULATED_OCSP_VALUE, der);
            }
        }

        if !artifacts.crls.is_empty() {
            let crl_values =
                doc.create_element(QName::new("xades", ns::node::CRL_VALUES, ns::XADES));
            doc.append_child(revocation, crl_values);
            for der in &artifacts.crls {
                append_encapsulated(doc, crl_values, ns::node::ENCAPSULATED_CRL_VALUE, der);
            }
        }
    }

    log::debug!(
        "embedded {} certificates, {} OCSP responses, {} CRLs",
        artifacts.certificates.len(),
        artifacts.ocsp_responses.len(),
        artifacts.crls.len()
    );
    Ok(())
}

fn append_encapsulated(doc: &mut SignableDocument, parent: NodeId, name: &str, der: &[u8]) {
    let el = doc.create_element(QName::new("xades", name, ns::XADES));
    doc.set_attribute(el, QName::plain(ns::attr::ENCODING), ns::DER_ENCODING);
    doc.set_text(el, &format_base64_folded(der));
    doc.append_child(parent, el);
}

/// Walk (or build) Object > QualifyingProperties > UnsignedProperties >
/// UnsignedSignatureProperties under the signature.
fn unsigned_signature_properties(
    doc: &mut SignableDocument,
    signature: NodeId,
) -> Result<NodeId> {
    let object = match doc.find_child_element(signature, ns::DSIG, ns::node::OBJECT) {
        Some(o) => o,
        None => {
            let o = doc.create_element(QName::new("ds", ns::node::OBJECT, ns::DSIG));
            doc.append_child(signature, o);
            o
        }
    };

    let qp = match doc.find_child_element(object, ns::XADES, ns::node::QUALIFYING_PROPERTIES) {
        Some(q) => q,
        None => {
            let q = doc.create_element(QName::new(
                "xades",
                ns::node::QUALIFYING_PROPERTIES,
                ns::XADES,
            ));
            doc.declare_namespace(q, "xades", ns::XADES);
            if let Some(id) = doc.attribute(signature, ns::attr::ID).map(str::to_owned) {
                doc.set_attribute(q, QName::plain(ns::attr::TARGET), &format!("#{id}"));
            }
            doc.append_child(object, q);
            q
        }
    };

    let up = match doc.find_child_element(qp, ns::XADES, ns::node::UNSIGNED_PROPERTIES) {
        Some(u) => u,
        None => {
            let u = doc.create_element(QName::new("xades", ns::node::UNSIGNED_PROPERTIES, ns::XADES));
            doc.append_child(qp, u);
            u
        }
    };

    match doc.find_child_element(up, ns::XADES, ns::node::UNSIGNED_SIGNATURE_PROPERTIES) {
        Some(usp) => Ok(usp),
        None => {
            let usp = doc.create_element(QName::new(
                "xades",
                ns::node::UNSIGNED_SIGNATURE_PROPERTIES,
                ns::XADES,
            ));
            doc.append_child(up, usp);
            Ok(usp)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn placed_signature() -> (SignableDocument, NodeId) {
        let mut doc = SignableDocument::parse("<report/>").unwrap();
        let root = doc.root_element().unwrap();
        let sig = doc.create_element(QName::new("ds", ns::node::SIGNATURE, ns::DSIG));
        doc.declare_namespace(sig, "ds", ns::DSIG);
        doc.set_attribute(sig, QName::plain(ns::attr::ID), "SIG-1");
        doc.append_child(root, sig);
        (doc, sig)
    }

    fn artifacts() -> RevocationArtifacts {
        RevocationArtifacts {
            ocsp_responses: vec![vec![0x30, 0x0A, 0x01]],
            crls: vec![vec![0x30, 0x0B]],
            certificates: vec![vec![0x30, 0x0C], vec![0x30, 0x0D]],
        }
    }

    #[test]
    fn folding_breaks_lines_at_76_columns() {
        let folded = format_base64_folded(&vec![0xAB; 120]);
        let lines: Vec<&str> = folded.lines().collect();
        assert!(lines.len() > 1);
        for line in &lines[..lines.len() - 1] {
            assert_eq!(line.len(), FOLD_COLUMN);
        }
        assert!(lines.last().unwrap().len() <= FOLD_COLUMN);
        // Folding only inserts newlines.
        let joined: String = folded.chars().filter(|c| *c != '\n').collect();
        assert_eq!(
            joined,
            base64::engine::general_purpose::STANDARD.encode(vec![0xAB; 120])
        );
    }

    #[test]
    fn short_value_stays_on_one_line() {
        let folded = format_base64_folded(b"abc");
        assert!(!folded.contains('\n'));
    }

    #[test]
    fn builds_property_chain_and_values() {
        let (mut doc, sig) = placed_signature();
        embed_validation_material(&mut doc, sig, &artifacts()).unwrap();

        let object = doc
            .find_child_element(sig, ns::DSIG, ns::node::OBJECT)
            .unwrap();
        let qp = doc
            .find_child_element(object, ns::XADES, ns::node::QUALIFYING_PROPERTIES)
            .unwrap();
        assert_eq!(doc.attribute(qp, ns::attr::TARGET), Some("#SIG-1"));
        let up = doc
            .find_child_element(qp, ns::XADES, ns::node::UNSIGNED_PROPERTIES)
            .unwrap();
        let usp = doc
            .find_child_element(up, ns::XADES, ns::node::UNSIGNED_SIGNATURE_PROPERTIES)
            .unwrap();

        let cert_values = doc
            .find_child_element(usp, ns::XADES, ns::node::CERTIFICATE_VALUES)
            .unwrap();
        assert_eq!(doc.children(cert_values).len(), 2);

        let revocation = doc
            .find_child_element(usp, ns::XADES, ns::node::REVOCATION_VALUES)
            .unwrap();
        assert!(doc
            .find_child_element(revocation, ns::XADES, ns::node::OCSP_VALUES)
            .is_some());
        assert!(doc
            .find_child_element(revocation, ns::XADES, ns::node::CRL_VALUES)
            .is_some());
    }

    #[test]
    fn encapsulated_values_carry_der_encoding_marker() {
        let (mut doc, sig) = placed_signature();
        embed_validation_material(&mut doc, sig, &artifacts()).unwrap();
        let ocsp = doc
            .find_element(ns::XADES, ns::node::ENCAPSULATED_OCSP_VALUE)
            .unwrap();
        assert_eq!(doc.attribute(ocsp, ns::attr::ENCODING), Some(ns::DER_ENCODING));
        assert_eq!(doc.text_content(ocsp), format_base64_folded(&[0x30, 0x0A, 0x01]));
    }

    #[test]
    fn empty_artifacts_change_nothing() {
        let (mut doc, sig) = placed_signature();
        embed_validation_material(&mut doc, sig, &RevocationArtifacts::default()).unwrap();
        assert!(doc
            .find_child_element(sig, ns::DSIG, ns::node::OBJECT)
            .is_none());
    }

    #[test]
    fn reuses_existing_property_chain() {
        let (mut doc, sig) = placed_signature();
        embed_validation_material(&mut doc, sig, &artifacts()).unwrap();
        embed_validation_material(&mut doc, sig, &artifacts()).unwrap();
        // One Object, one QualifyingProperties, accumulated values.
        let objects = doc
            .children(sig)
            .iter()
            .filter(|c| {
                doc.element(**c)
                    .map(|e| e.name.local == ns::node::OBJECT)
                    .unwrap_or(false)
            })
            .count();
        assert_eq!(objects, 1);
    }

    #[test]
    fn non_signature_target_is_rejected() {
        let mut doc = SignableDocument::parse("<report/>").unwrap();
        let root = doc.root_element().unwrap();
        let result = embed_validation_material(&mut doc, root, &artifacts());
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }
}

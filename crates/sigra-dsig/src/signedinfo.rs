#![forbid(unsafe_code)]

//! SignedInfo construction.
//!
//! For each declared reference the target subtree is resolved,
//! canonicalized with exclusive C14N and digested. The assembled
//! `ds:SignedInfo` element is then canonicalized itself; those bytes
//! are the exact input to the signing primitive. Any byte-level change
//! to them (whitespace, attribute order, namespace rendering) would
//! change the signature, so the element is built once and kept as a
//! detached fragment until the whole signature block is placed.

use crate::reference::{ReferenceDescriptor, ReferenceKind, ReferenceSpec};
use base64::Engine;
use sigra_core::{algorithm, ns, Error, Result};
use sigra_crypto::{digest, sign, KeyType};
use sigra_xml::{IdIndex, NodeId, QName, SignableDocument};

/// The assembled, canonicalized SignedInfo.
pub struct SignedInfoBlock {
    /// Detached fragment whose root is the `ds:SignedInfo` element.
    fragment: SignableDocument,
    root: NodeId,
    references: Vec<ReferenceDescriptor>,
    canonicalization_method: &'static str,
    signature_method: &'static str,
    /// Canonical serialization of the fragment; the to-be-signed bytes.
    canonical_bytes: Vec<u8>,
}

impl SignedInfoBlock {
    /// The exact bytes the signing primitive receives.
    pub fn canonical_bytes(&self) -> &[u8] {
        &self.canonical_bytes
    }

    pub fn references(&self) -> &[ReferenceDescriptor] {
        &self.references
    }

    pub fn signature_method(&self) -> &'static str {
        self.signature_method
    }

    pub fn canonicalization_method(&self) -> &'static str {
        self.canonicalization_method
    }

    /// The fragment holding the `ds:SignedInfo` element, for import
    /// into the final signature block.
    pub fn fragment(&self) -> (&SignableDocument, NodeId) {
        (&self.fragment, self.root)
    }
}

/// Builds a [`SignedInfoBlock`] from a declared reference list.
pub struct SignedInfoBuilder<'a> {
    doc: &'a SignableDocument,
    index: &'a IdIndex,
    /// Source for signed-properties references: a detached fragment
    /// (the qualifying properties built before signing) and its index.
    properties: Option<(&'a SignableDocument, &'a IdIndex)>,
    digest_method: &'static str,
}

impl<'a> SignedInfoBuilder<'a> {
    pub fn new(doc: &'a SignableDocument, index: &'a IdIndex) -> Self {
        Self {
            doc,
            index,
            properties: None,
            digest_method: algorithm::SHA256,
        }
    }

    /// Register the fragment that signed-properties references resolve
    /// against. The fragment must be structurally complete: digesting
    /// happens at build time and later mutation of a digested subtree
    /// silently invalidates the signature.
    pub fn with_properties(mut self, fragment: &'a SignableDocument, index: &'a IdIndex) -> Self {
        self.properties = Some((fragment, index));
        self
    }

    /// Build the SignedInfo for the declared reference list, in the
    /// declared order. The signature method is derived from the key
    /// type, never from caller input.
    pub fn build(&self, specs: &[ReferenceSpec], key_type: KeyType) -> Result<SignedInfoBlock> {
        if specs.is_empty() {
            return Err(Error::InvalidInput("empty reference list".into()));
        }

        let mut references = Vec::with_capacity(specs.len());
        for spec in specs {
            let (doc, node) = self.resolve(spec)?;
            let canonical = sigra_c14n::canonicalize_subtree(doc, node)?;
            let digest_value = digest::digest(self.digest_method, &canonical)?;
            log::debug!(
                "reference #{} digested ({} canonical bytes)",
                spec.target_id,
                canonical.len()
            );
            references.push(ReferenceDescriptor {
                target_id: spec.target_id.clone(),
                kind: spec.kind,
                transforms: vec![algorithm::EXC_C14N.to_owned()],
                digest_method: self.digest_method.to_owned(),
                digest_value,
            });
        }

        let signature_method = sign::algorithm_uri(key_type);
        let (fragment, root) = build_fragment(&references, signature_method)?;
        let canonical_bytes = sigra_c14n::canonicalize_subtree(&fragment, root)?;

        Ok(SignedInfoBlock {
            fragment,
            root,
            references,
            canonicalization_method: algorithm::EXC_C14N,
            signature_method,
            canonical_bytes,
        })
    }

    fn resolve(&self, spec: &ReferenceSpec) -> Result<(&'a SignableDocument, NodeId)> {
        match spec.kind {
            ReferenceKind::Data => Ok((self.doc, self.index.resolve(&spec.target_id)?)),
            ReferenceKind::SignedProperties => {
                let (fragment, index) = self.properties.ok_or_else(|| {
                    Error::InvalidInput(
                        "signed-properties reference without a properties fragment".into(),
                    )
                })?;
                Ok((fragment, index.resolve(&spec.target_id)?))
            }
        }
    }
}

/// Build the detached `ds:SignedInfo` element tree.
fn build_fragment(
    references: &[ReferenceDescriptor],
    signature_method: &str,
) -> Result<(SignableDocument, NodeId)> {
    let b64 = base64::engine::general_purpose::STANDARD;
    let mut doc = SignableDocument::empty();

    let signed_info = doc.create_element(QName::new("ds", ns::node::SIGNED_INFO, ns::DSIG));
    doc.declare_namespace(signed_info, "ds", ns::DSIG);
    let doc_root = doc.root();
    doc.append_child(doc_root, signed_info);

    let c14n_method =
        doc.create_element(QName::new("ds", ns::node::CANONICALIZATION_METHOD, ns::DSIG));
    doc.set_attribute(c14n_method, QName::plain(ns::attr::ALGORITHM), algorithm::EXC_C14N);
    doc.append_child(signed_info, c14n_method);

    let sig_method = doc.create_element(QName::new("ds", ns::node::SIGNATURE_METHOD, ns::DSIG));
    doc.set_attribute(sig_method, QName::plain(ns::attr::ALGORITHM), signature_method);
    doc.append_child(signed_info, sig_method);

    for reference in references {
        let ref_el = doc.create_element(QName::new("ds", ns::node::REFERENCE, ns::DSIG));
        doc.set_attribute(ref_el, QName::plain(ns::attr::URI), &reference.uri());
        if reference.kind == ReferenceKind::SignedProperties {
            doc.set_attribute(
                ref_el,
                QName::plain(ns::attr::TYPE),
                ns::SIGNED_PROPERTIES_TYPE,
            );
        }
        doc.append_child(signed_info, ref_el);

        let transforms = doc.create_element(QName::new("ds", ns::node::TRANSFORMS, ns::DSIG));
        doc.append_child(ref_el, transforms);
        for transform_uri in &reference.transforms {
            let transform = doc.create_element(QName::new("ds", ns::node::TRANSFORM, ns::DSIG));
            doc.set_attribute(transform, QName::plain(ns::attr::ALGORITHM), transform_uri);
            doc.append_child(transforms, transform);
        }

        let digest_method = doc.create_element(QName::new("ds", ns::node::DIGEST_METHOD, ns::DSIG));
        doc.set_attribute(
            digest_method,
            QName::plain(ns::attr::ALGORITHM),
            &reference.digest_method,
        );
        doc.append_child(ref_el, digest_method);

        let digest_value = doc.create_element(QName::new("ds", ns::node::DIGEST_VALUE, ns::DSIG));
        doc.set_text(digest_value, &b64.encode(&reference.digest_value));
        doc.append_child(ref_el, digest_value);
    }

    Ok((doc, signed_info))
}

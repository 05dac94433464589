#![forbid(unsafe_code)]

//! Assembly of the `ds:Signature` element.
//!
//! The envelope is built as a detached fragment so the main document is
//! never mutated before signing completes. The SignedInfo subtree is
//! imported verbatim from the block that produced the signed bytes;
//! rebuilding it here would risk a byte-level divergence from what was
//! actually signed.

use crate::signedinfo::SignedInfoBlock;
use base64::Engine;
use sigra_core::{ns, Result};
use sigra_xml::{NodeId, QName, SignableDocument};

/// How the verifier locates the signing certificate.
#[derive(Debug, Clone)]
pub enum KeyIdentifier {
    /// WS-Security style: a `wsse:SecurityTokenReference` pointing at a
    /// BinarySecurityToken elsewhere in the message.
    SecurityTokenReference {
        /// URI of the token, including the leading `#`.
        token_uri: String,
    },
    /// The DER certificate embedded directly as `ds:X509Certificate`.
    EmbeddedCertificate { der: Vec<u8> },
}

/// A complete signature ready for placement.
pub struct SignatureEnvelope {
    signature_id: String,
    signed_info: SignedInfoBlock,
    signature_value: Vec<u8>,
    key_identifier: KeyIdentifier,
    /// XAdES qualifying properties, attached under a `ds:Object`.
    properties: Option<(SignableDocument, NodeId)>,
}

impl SignatureEnvelope {
    pub fn new(
        signature_id: &str,
        signed_info: SignedInfoBlock,
        signature_value: Vec<u8>,
        key_identifier: KeyIdentifier,
    ) -> Self {
        Self {
            signature_id: signature_id.to_owned(),
            signed_info,
            signature_value,
            key_identifier,
            properties: None,
        }
    }

    /// Attach a qualifying-properties fragment. Its root is imported
    /// under a `ds:Object` child of the signature.
    pub fn with_properties(mut self, fragment: SignableDocument, root: NodeId) -> Self {
        self.properties = Some((fragment, root));
        self
    }

    pub fn signature_id(&self) -> &str {
        &self.signature_id
    }

    pub fn signature_value(&self) -> &[u8] {
        &self.signature_value
    }

    pub fn signed_info(&self) -> &SignedInfoBlock {
        &self.signed_info
    }

    /// Build the `ds:Signature` fragment. The returned node is the
    /// signature element inside the returned document.
    pub fn build_fragment(&self) -> Result<(SignableDocument, NodeId)> {
        let b64 = base64::engine::general_purpose::STANDARD;
        let mut doc = SignableDocument::empty();

        let signature = doc.create_element(QName::new("ds", ns::node::SIGNATURE, ns::DSIG));
        doc.declare_namespace(signature, "ds", ns::DSIG);
        doc.set_attribute(signature, QName::plain(ns::attr::ID), &self.signature_id);
        let doc_root = doc.root();
        doc.append_child(doc_root, signature);

        let (si_doc, si_root) = self.signed_info.fragment();
        let signed_info = doc.import_subtree(si_doc, si_root);
        doc.append_child(signature, signed_info);

        let value = doc.create_element(QName::new("ds", ns::node::SIGNATURE_VALUE, ns::DSIG));
        doc.set_text(value, &b64.encode(&self.signature_value));
        doc.append_child(signature, value);

        let key_info = doc.create_element(QName::new("ds", ns::node::KEY_INFO, ns::DSIG));
        doc.append_child(signature, key_info);
        match &self.key_identifier {
            KeyIdentifier::SecurityTokenReference { token_uri } => {
                let str_el = doc.create_element(QName::new(
                    "wsse",
                    ns::node::SECURITY_TOKEN_REFERENCE,
                    ns::WSSE,
                ));
                doc.declare_namespace(str_el, "wsse", ns::WSSE);
                doc.append_child(key_info, str_el);
                let reference =
                    doc.create_element(QName::new("wsse", ns::node::REFERENCE, ns::WSSE));
                doc.set_attribute(reference, QName::plain(ns::attr::URI), token_uri);
                doc.set_attribute(
                    reference,
                    QName::plain(ns::attr::VALUE_TYPE),
                    ns::BST_VALUE_X509V3,
                );
                doc.append_child(str_el, reference);
            }
            KeyIdentifier::EmbeddedCertificate { der } => {
                let x509_data = doc.create_element(QName::new("ds", ns::node::X509_DATA, ns::DSIG));
                doc.append_child(key_info, x509_data);
                let cert =
                    doc.create_element(QName::new("ds", ns::node::X509_CERTIFICATE, ns::DSIG));
                doc.set_text(cert, &b64.encode(der));
                doc.append_child(x509_data, cert);
            }
        }

        if let Some((props_doc, props_root)) = &self.properties {
            let object = doc.create_element(QName::new("ds", ns::node::OBJECT, ns::DSIG));
            doc.append_child(signature, object);
            let imported = doc.import_subtree(props_doc, *props_root);
            doc.append_child(object, imported);
        }

        Ok((doc, signature))
    }
}

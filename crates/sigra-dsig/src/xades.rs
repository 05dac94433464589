#![forbid(unsafe_code)]

//! XAdES qualifying properties.
//!
//! SignedProperties is built as a detached fragment before digesting,
//! because the signature covers it: the fragment must be byte-stable
//! from the moment its digest is computed until placement. The fragment
//! is later attached under the signature's `ds:Object` untouched.

use crate::cert::CertificateInfo;
use base64::Engine;
use chrono::{DateTime, SecondsFormat, Utc};
use sigra_core::{algorithm, ns, Result};
use sigra_crypto::digest;
use sigra_xml::{NodeId, QName, SignableDocument};

/// A built qualifying-properties fragment.
pub struct QualifyingProperties {
    doc: SignableDocument,
    root: NodeId,
    signed_properties_id: String,
}

impl QualifyingProperties {
    /// Build the fragment for the given signature id.
    ///
    /// The SignedProperties id is derived as `<sig_id>-signedprops`;
    /// the caller registers it as a signed-properties reference.
    pub fn build(
        signature_id: &str,
        leaf_certificate: &[u8],
        signing_time: DateTime<Utc>,
    ) -> Result<Self> {
        let info = CertificateInfo::parse(leaf_certificate)?;
        let cert_digest = digest::digest(algorithm::SHA256, leaf_certificate)?;
        let b64 = base64::engine::general_purpose::STANDARD;
        let signed_properties_id = format!("{signature_id}-signedprops");

        let mut doc = SignableDocument::empty();
        let qp = doc.create_element(QName::new(
            "xades",
            ns::node::QUALIFYING_PROPERTIES,
            ns::XADES,
        ));
        doc.declare_namespace(qp, "xades", ns::XADES);
        doc.declare_namespace(qp, "ds", ns::DSIG);
        doc.set_attribute(qp, QName::plain(ns::attr::TARGET), &format!("#{signature_id}"));
        let doc_root = doc.root();
        doc.append_child(doc_root, qp);

        let signed_props =
            doc.create_element(QName::new("xades", ns::node::SIGNED_PROPERTIES, ns::XADES));
        doc.set_attribute(signed_props, QName::plain(ns::attr::ID), &signed_properties_id);
        doc.append_child(qp, signed_props);

        let ssp = doc.create_element(QName::new(
            "xades",
            ns::node::SIGNED_SIGNATURE_PROPERTIES,
            ns::XADES,
        ));
        doc.append_child(signed_props, ssp);

        let signing_time_el =
            doc.create_element(QName::new("xades", ns::node::SIGNING_TIME, ns::XADES));
        doc.set_text(
            signing_time_el,
            &signing_time.to_rfc3339_opts(SecondsFormat::Millis, true),
        );
        doc.append_child(ssp, signing_time_el);

        let signing_cert = doc.create_element(QName::new(
            "xades",
            ns::node::SIGNING_CERTIFICATE,
            ns::XADES,
        ));
        doc.append_child(ssp, signing_cert);
        let cert = doc.create_element(QName::new("xades", ns::node::CERT, ns::XADES));
        doc.append_child(signing_cert, cert);

        let digest_el = doc.create_element(QName::new("xades", ns::node::CERT_DIGEST, ns::XADES));
        doc.append_child(cert, digest_el);
        let method = doc.create_element(QName::new("ds", ns::node::DIGEST_METHOD, ns::DSIG));
        doc.set_attribute(method, QName::plain(ns::attr::ALGORITHM), algorithm::SHA256);
        doc.append_child(digest_el, method);
        let value = doc.create_element(QName::new("ds", ns::node::DIGEST_VALUE, ns::DSIG));
        doc.set_text(value, &b64.encode(&cert_digest));
        doc.append_child(digest_el, value);

        let issuer_serial =
            doc.create_element(QName::new("xades", ns::node::ISSUER_SERIAL, ns::XADES));
        doc.append_child(cert, issuer_serial);
        let issuer = doc.create_element(QName::new("ds", ns::node::X509_ISSUER_NAME, ns::DSIG));
        doc.set_text(issuer, info.issuer());
        doc.append_child(issuer_serial, issuer);
        let serial = doc.create_element(QName::new("ds", ns::node::X509_SERIAL_NUMBER, ns::DSIG));
        doc.set_text(serial, info.serial_decimal());
        doc.append_child(issuer_serial, serial);

        Ok(Self {
            doc,
            root: qp,
            signed_properties_id,
        })
    }

    pub fn document(&self) -> &SignableDocument {
        &self.doc
    }

    /// The `xades:QualifyingProperties` element.
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn signed_properties_id(&self) -> &str {
        &self.signed_properties_id
    }

    /// Consume the fragment for attachment to an envelope.
    pub fn into_parts(self) -> (SignableDocument, NodeId) {
        (self.doc, self.root)
    }
}

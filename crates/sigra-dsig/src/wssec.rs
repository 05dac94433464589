#![forbid(unsafe_code)]

//! WS-Security message preparation.
//!
//! Runs before reference resolution: it installs the security header,
//! the freshness timestamp and the certificate token, and stamps the
//! identifiers the signature references will point at. Everything here
//! happens before any digest is computed.

use crate::cert::CertificateInfo;
use base64::Engine;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use sigra_core::{ns, Error, Result};
use sigra_xml::{NodeId, QName, SignableDocument};

/// Identifier stamped on the timestamp element.
pub const TIMESTAMP_ID: &str = "SignedSoapTimestampContent";
/// Identifier stamped on the SOAP body.
pub const BODY_ID: &str = "SignedSoapBodyContent";
/// Timestamp validity window.
pub const TIMESTAMP_VALIDITY_SECONDS: i64 = 30;

/// Handles to the elements a WS-Security signature references.
#[derive(Debug, Clone)]
pub struct PreparedEnvelope {
    pub security: NodeId,
    pub timestamp_id: String,
    pub body_id: String,
    /// Id of the BinarySecurityToken, `X509-<serial>`.
    pub token_id: String,
}

/// Prepare a SOAP envelope for signing: security header, timestamp,
/// body id and certificate token.
pub fn prepare(
    doc: &mut SignableDocument,
    leaf_certificate: &[u8],
) -> Result<PreparedEnvelope> {
    prepare_at(doc, leaf_certificate, Utc::now())
}

/// [`prepare`] with an explicit clock, for deterministic output.
pub fn prepare_at(
    doc: &mut SignableDocument,
    leaf_certificate: &[u8],
    now: DateTime<Utc>,
) -> Result<PreparedEnvelope> {
    let envelope = doc
        .root_element()
        .ok_or_else(|| Error::InvalidInput("document has no root element".into()))?;
    let soap_ns = soap_namespace(doc, envelope)?;
    let soap_prefix = doc
        .element(envelope)
        .map(|e| e.name.prefix.clone())
        .unwrap_or_default();

    let body = doc
        .find_child_element(envelope, &soap_ns, ns::node::BODY)
        .ok_or_else(|| Error::InvalidInput("SOAP envelope has no Body".into()))?;

    let header = match doc.find_child_element(envelope, &soap_ns, ns::node::HEADER) {
        Some(h) => h,
        None => {
            let h = doc.create_element(QName::new(&soap_prefix, ns::node::HEADER, &soap_ns));
            doc.insert_before(envelope, h, body)?;
            h
        }
    };

    let security = match doc.find_child_element(header, ns::WSSE, ns::node::SECURITY) {
        Some(s) => s,
        None => {
            let s = doc.create_element(QName::new("wsse", ns::node::SECURITY, ns::WSSE));
            doc.declare_namespace(s, "wsse", ns::WSSE);
            doc.declare_namespace(s, "wsu", ns::WSU);
            doc.insert_first(header, s);
            s
        }
    };

    install_timestamp(doc, security, now);

    // The body reference uses a plain Id. A leftover wsu:Id would make
    // the identifier ambiguous, so it is stripped first.
    doc.remove_attribute(body, ns::WSU, ns::attr::ID);
    doc.set_attribute(body, QName::plain(ns::attr::ID), BODY_ID);

    let token_id = install_token(doc, security, leaf_certificate)?;

    log::debug!("prepared WS-Security envelope, token {token_id}");
    Ok(PreparedEnvelope {
        security,
        timestamp_id: TIMESTAMP_ID.to_owned(),
        body_id: BODY_ID.to_owned(),
        token_id,
    })
}

/// Signature reference order for a prepared envelope: timestamp first,
/// then body. The order is fixed by the profile.
pub fn reference_ids() -> [&'static str; 2] {
    [TIMESTAMP_ID, BODY_ID]
}

fn soap_namespace(doc: &SignableDocument, envelope: NodeId) -> Result<String> {
    let element = doc
        .element(envelope)
        .ok_or_else(|| Error::InvalidInput("document root is not an element".into()))?;
    match element.name.ns_uri.as_str() {
        ns::SOAP11 | ns::SOAP12 => Ok(element.name.ns_uri.clone()),
        other => Err(Error::InvalidInput(format!(
            "root element is not a SOAP envelope (namespace {other:?})"
        ))),
    }
}

fn install_timestamp(doc: &mut SignableDocument, security: NodeId, now: DateTime<Utc>) {
    if let Some(old) = doc.find_child_element(security, ns::WSU, ns::node::TIMESTAMP) {
        doc.detach(old);
    }
    let timestamp = doc.create_element(QName::new("wsu", ns::node::TIMESTAMP, ns::WSU));
    doc.set_attribute(
        timestamp,
        QName::new("wsu", ns::attr::ID, ns::WSU),
        TIMESTAMP_ID,
    );

    let created = doc.create_element(QName::new("wsu", ns::node::CREATED, ns::WSU));
    doc.set_text(created, &format_instant(now));
    doc.append_child(timestamp, created);

    let expires = doc.create_element(QName::new("wsu", ns::node::EXPIRES, ns::WSU));
    let expiry = now + Duration::seconds(TIMESTAMP_VALIDITY_SECONDS);
    doc.set_text(expires, &format_instant(expiry));
    doc.append_child(timestamp, expires);

    doc.insert_first(security, timestamp);
}

fn install_token(
    doc: &mut SignableDocument,
    security: NodeId,
    leaf_certificate: &[u8],
) -> Result<String> {
    let info = CertificateInfo::parse(leaf_certificate)?;
    let token_id = info.token_id();

    if let Some(old) =
        doc.find_child_element(security, ns::WSSE, ns::node::BINARY_SECURITY_TOKEN)
    {
        doc.detach(old);
    }
    let token = doc.create_element(QName::new("wsse", ns::node::BINARY_SECURITY_TOKEN, ns::WSSE));
    doc.set_attribute(
        token,
        QName::plain(ns::attr::ENCODING_TYPE),
        ns::BST_ENCODING_BASE64,
    );
    doc.set_attribute(
        token,
        QName::plain(ns::attr::VALUE_TYPE),
        ns::BST_VALUE_X509V3,
    );
    doc.set_attribute(token, QName::new("wsu", ns::attr::ID, ns::WSU), &token_id);
    let b64 = base64::engine::general_purpose::STANDARD;
    doc.set_text(token, &b64.encode(leaf_certificate));
    doc.append_child(security, token);

    Ok(token_id)
}

fn format_instant(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

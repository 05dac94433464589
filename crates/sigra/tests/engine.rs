//! End-to-end pipeline tests: sign, re-parse the output and check the
//! signature actually verifies against the serialized form.

use base64::Engine as _;
use sigra::{
    EngineConfig, Error, PlaceholderReservation, RevocationArtifacts, RevocationFetcher,
    SignatureEngine, SigningMaterial, XadesRequest,
};
use sigra_core::{algorithm, ns};
use sigra_xml::{NodeId, SignableDocument};

const RSA_KEY: &str = include_str!("fixtures/key_pkcs8.pem");
const EC_KEY: &str = include_str!("fixtures/ec_key_pkcs8.pem");
const CERT: &[u8] = include_bytes!("fixtures/cert.der");
const EC_CERT: &[u8] = include_bytes!("fixtures/ec_cert.der");

const SOAP: &str = concat!(
    r#"<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/">"#,
    r#"<soapenv:Body><sendInvoice><inv>TR-2024-001</inv></sendInvoice></soapenv:Body>"#,
    r#"</soapenv:Envelope>"#
);

const REPORT: &str = concat!(
    r#"<report><content Id="RPT-1"><line>a</line><line>b</line></content></report>"#
);

fn rsa_material() -> SigningMaterial {
    sigra::load_signing_material(RSA_KEY, vec![CERT.to_vec()]).unwrap()
}

fn ec_material() -> SigningMaterial {
    sigra::load_signing_material(EC_KEY, vec![EC_CERT.to_vec()]).unwrap()
}

fn engine() -> SignatureEngine {
    SignatureEngine::new(EngineConfig::default())
}

/// Find the reference element whose URI points at `id`.
fn find_reference(doc: &SignableDocument, id: &str) -> Option<NodeId> {
    let uri = format!("#{id}");
    doc.descendants(doc.root())
        .into_iter()
        .filter(|n| {
            doc.element(*n)
                .map(|e| e.name.ns_uri == ns::DSIG && e.name.local == ns::node::REFERENCE)
                .unwrap_or(false)
        })
        .find(|n| doc.attribute(*n, ns::attr::URI) == Some(uri.as_str()))
}

/// Recompute a reference digest from the serialized output and compare
/// it with the DigestValue the signature carries.
fn assert_reference_digest(doc: &SignableDocument, target_id: &str) {
    let target = sigra_xml::IdIndex::build(doc)
        .unwrap()
        .resolve(target_id)
        .unwrap();
    let canonical = sigra_c14n::canonicalize_subtree(doc, target).unwrap();
    let recomputed = sigra_crypto::digest::digest(algorithm::SHA256, &canonical).unwrap();

    let reference = find_reference(doc, target_id).expect("reference present");
    let value = doc
        .find_child_element(reference, ns::DSIG, ns::node::DIGEST_VALUE)
        .unwrap();
    let expected = base64::engine::general_purpose::STANDARD.encode(recomputed);
    assert_eq!(doc.text_content(value), expected, "digest for #{target_id}");
}

/// Canonicalize SignedInfo from the serialized output and verify the
/// signature value against it.
fn assert_signature_verifies(doc: &SignableDocument, material: &SigningMaterial) {
    let signed_info = doc.find_element(ns::DSIG, ns::node::SIGNED_INFO).unwrap();
    let canonical = sigra_c14n::canonicalize_subtree(doc, signed_info).unwrap();
    let value_el = doc
        .find_element(ns::DSIG, ns::node::SIGNATURE_VALUE)
        .unwrap();
    let sig_bytes = base64::engine::general_purpose::STANDARD
        .decode(doc.text_content(value_el).trim())
        .unwrap();
    assert!(
        sigra_crypto::sign::verify(material.key(), &canonical, &sig_bytes).unwrap(),
        "signature must verify against re-canonicalized SignedInfo"
    );
}

#[test]
fn soap_round_trip_rsa() {
    let material = rsa_material();
    let result = engine()
        .sign_soap(SOAP.as_bytes(), &material, "SIG-1")
        .unwrap();
    assert!(result.warning.is_none());

    let doc = SignableDocument::parse_bytes(&result.document).unwrap();

    // Signature is the first child of the security header.
    let security = doc.find_element(ns::WSSE, ns::node::SECURITY).unwrap();
    let first = doc.children(security)[0];
    let first_el = doc.element(first).unwrap();
    assert_eq!(first_el.name.local, ns::node::SIGNATURE);
    assert_eq!(doc.attribute(first, ns::attr::ID), Some("SIG-1"));

    // Token carries the certificate, base64 encoded.
    let token = doc
        .find_element(ns::WSSE, ns::node::BINARY_SECURITY_TOKEN)
        .unwrap();
    assert_eq!(
        doc.text_content(token),
        base64::engine::general_purpose::STANDARD.encode(CERT)
    );

    // Declared order: timestamp then body.
    let references: Vec<String> = doc
        .descendants(doc.root())
        .into_iter()
        .filter(|n| {
            doc.element(*n)
                .map(|e| e.name.ns_uri == ns::DSIG && e.name.local == ns::node::REFERENCE)
                .unwrap_or(false)
        })
        .filter_map(|n| doc.attribute(n, ns::attr::URI).map(str::to_owned))
        .collect();
    assert_eq!(
        references,
        ["#SignedSoapTimestampContent", "#SignedSoapBodyContent"]
    );

    assert_reference_digest(&doc, "SignedSoapTimestampContent");
    assert_reference_digest(&doc, "SignedSoapBodyContent");
    assert_signature_verifies(&doc, &material);
}

#[test]
fn soap12_round_trip_rsa() {
    let soap12 = concat!(
        r#"<env:Envelope xmlns:env="http://www.w3.org/2003/05/soap-envelope">"#,
        r#"<env:Body><sendInvoice><inv>TR-2024-002</inv></sendInvoice></env:Body>"#,
        r#"</env:Envelope>"#
    );
    let material = rsa_material();
    let result = engine()
        .sign_soap(soap12.as_bytes(), &material, "SIG-1")
        .unwrap();
    let doc = SignableDocument::parse_bytes(&result.document).unwrap();

    // The header was created in the SOAP 1.2 namespace, before the body.
    let envelope = doc.root_element().unwrap();
    let header = doc
        .find_child_element(envelope, ns::SOAP12, ns::node::HEADER)
        .unwrap();
    let body = doc
        .find_child_element(envelope, ns::SOAP12, ns::node::BODY)
        .unwrap();
    let children = doc.children(envelope);
    assert!(
        children.iter().position(|c| *c == header).unwrap()
            < children.iter().position(|c| *c == body).unwrap()
    );
    assert!(doc
        .find_child_element(header, ns::WSSE, ns::node::SECURITY)
        .is_some());

    assert_reference_digest(&doc, "SignedSoapTimestampContent");
    assert_reference_digest(&doc, "SignedSoapBodyContent");
    assert_signature_verifies(&doc, &material);
}

#[test]
fn soap_timestamp_window_is_thirty_seconds() {
    let result = engine()
        .sign_soap(SOAP.as_bytes(), &rsa_material(), "SIG-1")
        .unwrap();
    let doc = SignableDocument::parse_bytes(&result.document).unwrap();
    let timestamp = doc.find_element(ns::WSU, ns::node::TIMESTAMP).unwrap();
    let created = doc
        .find_child_element(timestamp, ns::WSU, ns::node::CREATED)
        .unwrap();
    let expires = doc
        .find_child_element(timestamp, ns::WSU, ns::node::EXPIRES)
        .unwrap();
    let created = chrono::DateTime::parse_from_rfc3339(&doc.text_content(created)).unwrap();
    let expires = chrono::DateTime::parse_from_rfc3339(&doc.text_content(expires)).unwrap();
    assert_eq!((expires - created).num_seconds(), 30);
}

#[test]
fn soap_round_trip_ecdsa() {
    let material = ec_material();
    let result = engine()
        .sign_soap(SOAP.as_bytes(), &material, "SIG-1")
        .unwrap();
    let doc = SignableDocument::parse_bytes(&result.document).unwrap();

    let method = doc
        .find_element(ns::DSIG, ns::node::SIGNATURE_METHOD)
        .unwrap();
    assert_eq!(
        doc.attribute(method, ns::attr::ALGORITHM),
        Some(algorithm::ECDSA_SHA256)
    );
    assert_signature_verifies(&doc, &material);
}

#[test]
fn duplicate_ids_fail_closed() {
    let poisoned = concat!(
        r#"<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/">"#,
        r#"<soapenv:Body><a Id="dup"/><b Id="dup"/></soapenv:Body>"#,
        r#"</soapenv:Envelope>"#
    );
    let result = engine().sign_soap(poisoned.as_bytes(), &rsa_material(), "SIG-1");
    assert!(matches!(result, Err(Error::ReferenceAmbiguous(_))));
}

struct StubFetcher;

impl RevocationFetcher for StubFetcher {
    fn fetch(&self, _chain: &[Vec<u8>]) -> sigra::Result<RevocationArtifacts> {
        Ok(RevocationArtifacts {
            ocsp_responses: vec![vec![0x30, 0x03, 0x0A, 0x01, 0x00]],
            crls: vec![],
            certificates: vec![CERT.to_vec()],
        })
    }
}

struct FailingFetcher;

impl RevocationFetcher for FailingFetcher {
    fn fetch(&self, _chain: &[Vec<u8>]) -> sigra::Result<RevocationArtifacts> {
        Err(Error::CacheFailure("responder unreachable".into()))
    }
}

#[test]
fn xades_round_trip_with_upgrade() {
    let material = rsa_material();
    let engine = engine();
    let result = engine
        .sign_xades(
            REPORT.as_bytes(),
            &material,
            &XadesRequest {
                signature_id: "SIG-RPT",
                target_id: "RPT-1",
                fetcher: Some(&StubFetcher),
                reservation: None,
            },
        )
        .unwrap();
    assert!(result.warning.is_none());
    // The operation's cache entry never outlives it.
    assert!(engine.cache().is_empty());

    let doc = SignableDocument::parse_bytes(&result.document).unwrap();

    // Signed properties are referenced with the XAdES type marker.
    let properties = doc
        .find_element(ns::XADES, ns::node::SIGNED_PROPERTIES)
        .unwrap();
    let properties_id = doc.attribute(properties, ns::attr::ID).unwrap().to_owned();
    let reference = find_reference(&doc, &properties_id).unwrap();
    assert_eq!(
        doc.attribute(reference, ns::attr::TYPE),
        Some(ns::SIGNED_PROPERTIES_TYPE)
    );

    // Validation material landed under the unsigned properties.
    let usp = doc
        .find_element(ns::XADES, ns::node::UNSIGNED_SIGNATURE_PROPERTIES)
        .unwrap();
    assert!(doc
        .find_child_element(usp, ns::XADES, ns::node::CERTIFICATE_VALUES)
        .is_some());
    let ocsp = doc
        .find_element(ns::XADES, ns::node::ENCAPSULATED_OCSP_VALUE)
        .unwrap();
    assert_eq!(
        doc.attribute(ocsp, ns::attr::ENCODING),
        Some(ns::DER_ENCODING)
    );

    // The upgrade did not break the signature.
    assert_reference_digest(&doc, "RPT-1");
    assert_reference_digest(&doc, &properties_id);
    assert_signature_verifies(&doc, &material);
}

#[test]
fn xades_upgrade_failure_is_nonfatal() {
    let material = rsa_material();
    let engine = engine();
    let result = engine
        .sign_xades(
            REPORT.as_bytes(),
            &material,
            &XadesRequest {
                signature_id: "SIG-RPT",
                target_id: "RPT-1",
                fetcher: Some(&FailingFetcher),
                reservation: None,
            },
        )
        .unwrap();
    assert!(result.warning.is_some());
    assert!(engine.cache().is_empty());

    let doc = SignableDocument::parse_bytes(&result.document).unwrap();
    assert!(doc
        .find_element(ns::XADES, ns::node::UNSIGNED_SIGNATURE_PROPERTIES)
        .is_none());
    assert_signature_verifies(&doc, &material);
}

#[test]
fn xades_reservation_pads_output() {
    let result = engine()
        .sign_xades(
            REPORT.as_bytes(),
            &rsa_material(),
            &XadesRequest {
                signature_id: "SIG-RPT",
                target_id: "RPT-1",
                fetcher: None,
                reservation: Some(PlaceholderReservation::new(64 * 1024)),
            },
        )
        .unwrap();
    assert_eq!(result.document.len(), 64 * 1024);
    // Trailing padding is whitespace after the document element, so
    // the output still parses.
    let doc = SignableDocument::parse_bytes(&result.document).unwrap();
    assert!(doc.root_element().is_some());
}

#[test]
fn xades_reservation_overflow_fails() {
    let result = engine().sign_xades(
        REPORT.as_bytes(),
        &rsa_material(),
        &XadesRequest {
            signature_id: "SIG-RPT",
            target_id: "RPT-1",
            fetcher: None,
            reservation: Some(PlaceholderReservation::new(128)),
        },
    );
    match result {
        Err(Error::SizeOverflow { reserved, actual }) => {
            assert_eq!(reserved, 128);
            assert!(actual > 128);
        }
        other => panic!("expected SizeOverflow, got {:?}", other.err()),
    }
}

#[test]
fn xades_target_must_not_be_document_element() {
    let doc = r#"<report Id="ROOT"><content>x</content></report>"#;
    let result = engine().sign_xades(
        doc.as_bytes(),
        &rsa_material(),
        &XadesRequest {
            signature_id: "SIG-1",
            target_id: "ROOT",
            fetcher: None,
            reservation: None,
        },
    );
    assert!(matches!(result, Err(Error::InvalidInput(_))));
}

#[test]
fn concurrent_signing_under_small_pool() {
    let engine = SignatureEngine::new(EngineConfig {
        max_sessions: 2,
        ..EngineConfig::default()
    });
    let material = rsa_material();

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..6)
            .map(|i| {
                let engine = &engine;
                let material = &material;
                scope.spawn(move || {
                    let id = format!("SIG-{i}");
                    engine.sign_soap(SOAP.as_bytes(), material, &id).unwrap()
                })
            })
            .collect();
        for handle in handles {
            let result = handle.join().unwrap();
            assert!(!result.signature_value.is_empty());
        }
    });
}

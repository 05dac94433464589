#![forbid(unsafe_code)]

//! The signing pipelines.
//!
//! Both profiles run the same fixed sequence: prepare the document,
//! index identifiers, digest the declared references, sign inside a
//! bounded session, place the finished signature, then (for upgrade
//! profiles) embed validation material. The session slot is held from
//! signing through placement and upgrade; the revocation cache entry
//! for the signature is removed on every exit path.

use chrono::Utc;
use sigra_core::{Error, Result};
use sigra_crypto::SigningMaterial;
use sigra_dsig::{
    wssec, KeyIdentifier, PlacementProfile, PlaceholderReservation, QualifyingProperties,
    ReferenceSpec, SignatureEnvelope, SignedInfoBuilder, SigningSession, SlotPool,
};
use sigra_upgrade::{embed_validation_material, RevocationCache, RevocationFetcher};
use sigra_xml::{writer, IdIndex, NodeId, SignableDocument};
use std::time::Duration;

/// Engine-wide settings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum concurrent signing sessions.
    pub max_sessions: usize,
    /// Admission wait limit; `None` blocks indefinitely.
    pub admission_wait: Option<Duration>,
    /// Retention for orphaned revocation cache entries.
    pub cache_ttl: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_sessions: 4,
            admission_wait: None,
            cache_ttl: sigra_upgrade::DEFAULT_TTL,
        }
    }
}

/// Outcome of a signing pipeline.
#[derive(Debug)]
pub struct SignResult {
    /// The serialized signed document.
    pub document: Vec<u8>,
    /// Base64 of the signature value.
    pub signature_value: String,
    /// Set when a non-fatal step (level upgrade) failed; the signature
    /// itself is valid.
    pub warning: Option<String>,
}

/// Parameters for the enveloped XAdES pipeline.
pub struct XadesRequest<'a> {
    pub signature_id: &'a str,
    /// Id of the element the signature covers. Must not be the
    /// document element, which receives the signature itself.
    pub target_id: &'a str,
    /// When present, the signature is upgraded with fetched validation
    /// material. Upgrade failure is reported as a warning.
    pub fetcher: Option<&'a dyn RevocationFetcher>,
    /// Optional fixed-size reservation for the serialized output.
    pub reservation: Option<PlaceholderReservation>,
}

/// A signature engine: bounded session pool plus revocation cache.
pub struct SignatureEngine {
    pool: SlotPool,
    cache: RevocationCache,
    admission_wait: Option<Duration>,
}

impl SignatureEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            pool: SlotPool::new(config.max_sessions),
            cache: RevocationCache::with_ttl(config.cache_ttl),
            admission_wait: config.admission_wait,
        }
    }

    /// The revocation cache, for external sweep scheduling.
    pub fn cache(&self) -> &RevocationCache {
        &self.cache
    }

    /// Sign a SOAP envelope under the WS-Security profile.
    ///
    /// The envelope is prepared in place: security header, timestamp
    /// and certificate token are installed, then the timestamp and
    /// body are digested in that order.
    pub fn sign_soap(
        &self,
        xml: &[u8],
        material: &SigningMaterial,
        signature_id: &str,
    ) -> Result<SignResult> {
        let mut doc = SignableDocument::parse_bytes(xml)?;
        let prepared = wssec::prepare(&mut doc, material.leaf_certificate())?;
        let index = IdIndex::build(&doc)?;

        let specs = [
            ReferenceSpec::data(&prepared.timestamp_id),
            ReferenceSpec::data(&prepared.body_id),
        ];
        let block = SignedInfoBuilder::new(&doc, &index).build(&specs, material.key_type())?;

        let session = self.open_session(material)?;
        let signature_value = session.sign(&block)?;
        let value_b64 = encode_b64(&signature_value);

        let envelope = SignatureEnvelope::new(
            signature_id,
            block,
            signature_value,
            KeyIdentifier::SecurityTokenReference {
                token_uri: format!("#{}", prepared.token_id),
            },
        );
        let (fragment, fragment_root) = envelope.build_fragment()?;
        PlacementProfile::ws_security().place(&mut doc, &fragment, fragment_root)?;
        drop(session);

        log::info!("signed SOAP envelope, signature {signature_id}");
        Ok(SignResult {
            document: writer::serialize(&doc),
            signature_value: value_b64,
            warning: None,
        })
    }

    /// Sign a document under the enveloped XAdES profile, optionally
    /// upgrading the signature with validation material.
    pub fn sign_xades(
        &self,
        xml: &[u8],
        material: &SigningMaterial,
        request: &XadesRequest<'_>,
    ) -> Result<SignResult> {
        // Evict entries abandoned by earlier operations before adding
        // a new one.
        if let Err(e) = self.cache.sweep() {
            log::warn!("revocation cache sweep failed: {e}");
        }

        let result = self.sign_xades_inner(xml, material, request);
        // The cache entry must not outlive the operation, on any path.
        if let Err(e) = self.cache.cleanup(request.signature_id) {
            log::warn!("revocation cache cleanup failed: {e}");
        }
        result
    }

    fn sign_xades_inner(
        &self,
        xml: &[u8],
        material: &SigningMaterial,
        request: &XadesRequest<'_>,
    ) -> Result<SignResult> {
        let mut doc = SignableDocument::parse_bytes(xml)?;
        let index = IdIndex::build(&doc)?;
        let target = index.resolve(request.target_id)?;
        if doc.root_element() == Some(target) {
            return Err(Error::InvalidInput(
                "signature target is the document element, which would \
                 contain the placed signature"
                    .into(),
            ));
        }

        let properties =
            QualifyingProperties::build(request.signature_id, material.leaf_certificate(), Utc::now())?;
        let properties_index = IdIndex::build(properties.document())?;

        let specs = [
            ReferenceSpec::data(request.target_id),
            ReferenceSpec::signed_properties(properties.signed_properties_id()),
        ];
        let block = SignedInfoBuilder::new(&doc, &index)
            .with_properties(properties.document(), &properties_index)
            .build(&specs, material.key_type())?;

        let session = self.open_session(material)?;
        let signature_value = session.sign(&block)?;
        let value_b64 = encode_b64(&signature_value);

        let (properties_doc, properties_root) = properties.into_parts();
        let envelope = SignatureEnvelope::new(
            request.signature_id,
            block,
            signature_value,
            KeyIdentifier::EmbeddedCertificate {
                der: material.leaf_certificate().to_vec(),
            },
        )
        .with_properties(properties_doc, properties_root);
        let (fragment, fragment_root) = envelope.build_fragment()?;
        let placed = PlacementProfile::enveloped().place(&mut doc, &fragment, fragment_root)?;

        let warning = match request.fetcher {
            Some(fetcher) => {
                match self.upgrade(&mut doc, placed, request.signature_id, material, fetcher) {
                    Ok(()) => None,
                    Err(e) => {
                        log::warn!(
                            "level upgrade for {} failed, signature kept at base level: {e}",
                            request.signature_id
                        );
                        Some(format!("level upgrade failed: {e}"))
                    }
                }
            }
            None => None,
        };
        drop(session);

        let mut document = writer::serialize(&doc);
        if let Some(reservation) = request.reservation {
            document = reservation.fill(&document)?;
        }

        log::info!("signed document, signature {}", request.signature_id);
        Ok(SignResult {
            document,
            signature_value: value_b64,
            warning,
        })
    }

    fn upgrade(
        &self,
        doc: &mut SignableDocument,
        signature: NodeId,
        signature_id: &str,
        material: &SigningMaterial,
        fetcher: &dyn RevocationFetcher,
    ) -> Result<()> {
        let artifacts = fetcher.fetch(material.chain())?;
        self.cache.insert(signature_id, artifacts)?;
        let artifacts = self
            .cache
            .get(signature_id)?
            .ok_or_else(|| Error::CacheFailure("artifacts missing after insert".into()))?;
        embed_validation_material(doc, signature, &artifacts)
    }

    fn open_session<'a>(&self, material: &'a SigningMaterial) -> Result<SigningSession<'a>> {
        match self.admission_wait {
            Some(limit) => SigningSession::open_timeout(&self.pool, material, limit),
            None => SigningSession::open(&self.pool, material),
        }
    }
}

fn encode_b64(data: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(data)
}

#![forbid(unsafe_code)]

//! XML-DSig construction for the Sigra signature engine.
//!
//! The signing pipeline runs in a fixed order: resolve the declared
//! references, canonicalize and digest each target, canonicalize the
//! assembled SignedInfo, sign it inside the bounded critical section,
//! then place the finished signature block into the document. Digesting
//! happens strictly after all structural mutation of the digested
//! subtrees; placement never touches a subtree that was digested.

pub mod cert;
pub mod envelope;
pub mod placement;
pub mod reference;
pub mod session;
pub mod signedinfo;
pub mod wssec;
pub mod xades;

pub use cert::CertificateInfo;
pub use envelope::{KeyIdentifier, SignatureEnvelope};
pub use placement::{Occupancy, PlacementAnchor, PlacementProfile, PlaceholderReservation};
pub use reference::{ReferenceDescriptor, ReferenceKind, ReferenceSpec};
pub use session::{SigningSession, SlotGuard, SlotPool};
pub use signedinfo::{SignedInfoBlock, SignedInfoBuilder};
pub use wssec::PreparedEnvelope;
pub use xades::QualifyingProperties;

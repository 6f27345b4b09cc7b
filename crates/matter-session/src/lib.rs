//! The Session Layer (spec.md §4.D): PASE/CASE establishment, the Group
//! key store, session parameter negotiation, and the `SessionManager` that
//! owns every live session for this node.

pub mod case;
pub mod error;
pub mod group;
pub mod manager;
pub mod params;
pub mod pase;
pub mod session;

pub use case::{CaseInitiator, CaseResponder, CaseSessionKeys, CertificateVerifier, NodeIdentity, NoopCertificateVerifier, ResumptionStore, Sigma1, Sigma2, Sigma2Resume, Sigma3};
pub use error::SessionError;
pub use group::{GroupKey, GroupKeyStore};
pub use manager::{OutgoingKey, SessionDestroyed, SessionManager};
pub use params::{PeerParametersInput, SessionParameters, SupportedTransports, OUR_DEFAULTS, PEER_FALLBACK};
pub use pase::{PaseInitiator, PaseResponder, PaseWindow, PbkdfParamRequest, PbkdfParamResponse, PbkdfParams};
pub use session::{Session, SessionKind};

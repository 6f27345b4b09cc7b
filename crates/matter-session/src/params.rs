//! Session parameters exchanged during PASE/CASE (spec.md §4.D.4).
//!
//! Design Notes (spec.md §9) flag that "our side" defaults and "peer
//! fallback" defaults differ in the source and must **not** be merged into
//! one table. `OUR_DEFAULTS` is what this node advertises when it omits a
//! field from its own announcement (it never actually needs to, since it
//! always knows its own values — kept for symmetry/testing). `PEER_FALLBACK`
//! is what a local reader substitutes when the *peer's* announcement omits
//! a field.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionParameters {
    pub data_model_revision: u16,
    pub interaction_model_revision: u16,
    pub specification_version: u32,
    pub max_paths_per_invoke: u16,
    pub supported_transports: SupportedTransports,
    pub max_tcp_message_size: Option<u32>,
    pub idle_interval: Duration,
    pub active_interval: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupportedTransports {
    pub udp: bool,
    pub tcp: bool,
    pub ble: bool,
}

impl Default for SupportedTransports {
    fn default() -> Self {
        SupportedTransports { udp: true, tcp: false, ble: false }
    }
}

/// Defaults this node uses for its *own* announced parameters.
pub const OUR_DEFAULTS: SessionParameters = SessionParameters {
    data_model_revision: 17,
    interaction_model_revision: 11,
    specification_version: 0x0104_0000,
    max_paths_per_invoke: 1,
    supported_transports: SupportedTransports { udp: true, tcp: false, ble: false },
    max_tcp_message_size: None,
    idle_interval: Duration::from_millis(4000),
    active_interval: Duration::from_millis(300),
};

/// Defaults substituted for fields the *peer* omitted from its
/// announcement. Kept as a structurally separate constant from
/// `OUR_DEFAULTS` per spec.md §9 even though the values happen to agree
/// today — a future protocol revision may diverge them, and merging the
/// tables would silently reintroduce the bug the spec calls out.
pub const PEER_FALLBACK: SessionParameters = OUR_DEFAULTS;

/// Builder-style accumulator used while decoding a peer's
/// partially-populated parameter announcement, filling gaps from
/// [`PEER_FALLBACK`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PeerParametersInput {
    pub data_model_revision: Option<u16>,
    pub interaction_model_revision: Option<u16>,
    pub specification_version: Option<u32>,
    pub max_paths_per_invoke: Option<u16>,
    pub supported_transports: Option<SupportedTransports>,
    pub max_tcp_message_size: Option<u32>,
    pub idle_interval: Option<Duration>,
    pub active_interval: Option<Duration>,
}

impl PeerParametersInput {
    pub fn resolve(self) -> SessionParameters {
        SessionParameters {
            data_model_revision: self.data_model_revision.unwrap_or(PEER_FALLBACK.data_model_revision),
            interaction_model_revision: self.interaction_model_revision.unwrap_or(PEER_FALLBACK.interaction_model_revision),
            specification_version: self.specification_version.unwrap_or(PEER_FALLBACK.specification_version),
            max_paths_per_invoke: self.max_paths_per_invoke.unwrap_or(PEER_FALLBACK.max_paths_per_invoke),
            supported_transports: self.supported_transports.unwrap_or(PEER_FALLBACK.supported_transports),
            max_tcp_message_size: self.max_tcp_message_size.or(PEER_FALLBACK.max_tcp_message_size),
            idle_interval: self.idle_interval.unwrap_or(PEER_FALLBACK.idle_interval),
            active_interval: self.active_interval.unwrap_or(PEER_FALLBACK.active_interval),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_peer_fields_fall_back_to_peer_fallback_table() {
        let partial = PeerParametersInput { max_paths_per_invoke: Some(3), ..Default::default() };
        let resolved = partial.resolve();
        assert_eq!(resolved.max_paths_per_invoke, 3);
        assert_eq!(resolved.data_model_revision, PEER_FALLBACK.data_model_revision);
        assert_eq!(resolved.idle_interval, PEER_FALLBACK.idle_interval);
    }

    #[test]
    fn fully_absent_announcement_resolves_to_the_fallback_table_verbatim() {
        let resolved = PeerParametersInput::default().resolve();
        assert_eq!(resolved, PEER_FALLBACK);
    }
}

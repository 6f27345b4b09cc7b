//! PASE: Password-Authenticated Session Establishment via SPAKE2+
//! (spec.md §4.D.1). The five-message exchange is modeled as two explicit
//! state machines (commissioner-side [`PaseInitiator`], device-side
//! [`PaseResponder`]) that each return either the next message to send or
//! a [`SessionError`] — no exceptions mid-handshake, per spec.md §9.

use crate::error::SessionError;
use crate::params::SessionParameters;
use matter_crypto::spake2plus::{
    compute_l, confirm_mac, derive_w0_w1, initiator_finish, initiator_share, random_scalar, responder_finish,
    responder_share, DerivedKeys,
};
use p256::Scalar;
use rand::RngCore;
use std::time::{Duration, Instant};
use zeroize::Zeroize;

/// Fallback PBKDF2 parameters used only when a side omits `pbkdfParams`
/// (spec.md §4 [SUPPLEMENT]; real commissioning always supplies explicit
/// params).
pub const FALLBACK_PBKDF_ITERATIONS: u32 = 1000;
pub const FALLBACK_PBKDF_SALT: [u8; 16] = [0u8; 16];

#[derive(Debug, Clone)]
pub struct PbkdfParams {
    pub iterations: u32,
    pub salt: Vec<u8>,
}

impl Default for PbkdfParams {
    fn default() -> Self {
        PbkdfParams { iterations: FALLBACK_PBKDF_ITERATIONS, salt: FALLBACK_PBKDF_SALT.to_vec() }
    }
}

#[derive(Debug, Clone)]
pub struct PbkdfParamRequest {
    pub initiator_random: [u8; 32],
    pub initiator_session_id: u16,
    pub passcode_id: u16,
    pub has_pbkdf_params: bool,
}

#[derive(Debug, Clone)]
pub struct PbkdfParamResponse {
    pub responder_random: [u8; 32],
    pub responder_session_id: u16,
    pub pbkdf_params: Option<PbkdfParams>,
    pub responder_session_params: SessionParameters,
}

#[derive(Debug, Clone, Copy)]
pub struct Pake1 {
    pub x: [u8; 65],
}

#[derive(Debug, Clone, Copy)]
pub struct Pake2 {
    pub y: [u8; 65],
    pub h_bx: [u8; 32],
}

#[derive(Debug, Clone, Copy)]
pub struct Pake3 {
    pub h_ay: [u8; 32],
}

/// Commissioning window invariants shared across PASE attempts on a single
/// device (spec.md §4.D.1): a 60s pairing timer per attempt, at most one
/// handshake in flight, and a 20-error cumulative budget before the window
/// closes entirely.
pub struct PaseWindow {
    opened_at: Instant,
    error_count: u32,
    in_flight: bool,
}

impl PaseWindow {
    pub const MAX_ERRORS: u32 = 20;
    pub const PAIRING_TIMEOUT: Duration = Duration::from_secs(60);

    pub fn open(now: Instant) -> Self {
        PaseWindow { opened_at: now, error_count: 0, in_flight: false }
    }

    /// A new `PbkdfParamRequest` arrived. Per spec.md §4.D.1, a request
    /// while one is already pending must be ignored.
    pub fn try_begin(&mut self) -> Result<(), SessionError> {
        if self.is_closed() {
            return Err(SessionError::TooManyErrors { count: self.error_count });
        }
        if self.in_flight {
            return Err(SessionError::PaseAlreadyInFlight);
        }
        self.in_flight = true;
        Ok(())
    }

    pub fn check_timeout(&self, now: Instant) -> Result<(), SessionError> {
        if now.duration_since(self.opened_at) > Self::PAIRING_TIMEOUT {
            Err(SessionError::PairingTimeout)
        } else {
            Ok(())
        }
    }

    pub fn record_success(&mut self) {
        self.in_flight = false;
    }

    pub fn record_error(&mut self) -> Result<(), SessionError> {
        self.in_flight = false;
        self.error_count += 1;
        if self.error_count >= Self::MAX_ERRORS {
            Err(SessionError::TooManyErrors { count: self.error_count })
        } else {
            Ok(())
        }
    }

    pub fn is_closed(&self) -> bool {
        self.error_count >= Self::MAX_ERRORS
    }
}

/// Commissioner side of PASE.
pub struct PaseInitiator {
    w0: Scalar,
    w1: Scalar,
    x: Scalar,
    big_x_bytes: [u8; 65],
    derived: Option<DerivedKeys>,
}

impl PaseInitiator {
    /// Message 1: build the `PbkdfParamRequest`. `initiator_session_id` is
    /// the commissioner's freshly-allocated local session id.
    pub fn build_request(initiator_session_id: u16) -> (PbkdfParamRequest, [u8; 32]) {
        let mut random = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut random);
        (
            PbkdfParamRequest { initiator_random: random, initiator_session_id, passcode_id: 0, has_pbkdf_params: false },
            random,
        )
    }

    /// Message 2 received: derive `w0`/`w1` from the passcode and the
    /// negotiated PBKDF params, generate the ephemeral share, and produce
    /// `Pake1`.
    pub fn on_param_response(passcode: u32, response: &PbkdfParamResponse) -> (Self, Pake1) {
        let params = response.pbkdf_params.clone().unwrap_or_default();
        let (w0, w1) = derive_w0_w1(passcode, &params.salt, params.iterations);
        let x = random_scalar();
        let big_x_bytes = initiator_share(&w0, &x);
        (PaseInitiator { w0, w1, x, big_x_bytes, derived: None }, Pake1 { x: big_x_bytes })
    }

    /// Message 4 received: finish the key agreement and produce `Pake3`'s
    /// confirmation MAC.
    pub fn on_pake2(&mut self, pake2: &Pake2) -> Result<Pake3, SessionError> {
        let derived = initiator_finish(&self.w0, &self.w1, &self.x, &pake2.y)?;
        let expected_h_bx = confirm_mac(&derived.ka, &self.big_x_bytes);
        if !matter_crypto::ct_eq(&expected_h_bx, &pake2.h_bx) {
            return Err(SessionError::KeyConfirmationFailed);
        }
        let h_ay = confirm_mac(&derived.ka, &pake2.y);
        self.derived = Some(derived);
        Ok(Pake3 { h_ay })
    }

    pub fn session_keys(&self) -> Option<DerivedKeys> {
        self.derived
    }
}

/// `w0`/`w1`/`x` are passcode- and handshake-derived secrets; `derived`
/// carries `Ke`/`Ka` once the handshake finishes. None of it should
/// outlive the handshake object itself.
impl Drop for PaseInitiator {
    fn drop(&mut self) {
        self.w0.zeroize();
        self.w1.zeroize();
        self.x.zeroize();
        self.derived.zeroize();
    }
}

/// Device side of PASE.
pub struct PaseResponder {
    w0: Scalar,
    l_bytes: [u8; 65],
    y: Scalar,
    big_y_bytes: [u8; 65],
    derived: Option<DerivedKeys>,
}

impl PaseResponder {
    /// Message 1 received: build `PbkdfParamResponse` from the device's
    /// setup-code-derived `w0`/`L` and this attempt's PBKDF params.
    pub fn build_response(
        responder_session_id: u16,
        pbkdf_params: PbkdfParams,
        our_session_params: SessionParameters,
    ) -> PbkdfParamResponse {
        let mut random = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut random);
        PbkdfParamResponse {
            responder_random: random,
            responder_session_id,
            pbkdf_params: Some(pbkdf_params),
            responder_session_params: our_session_params,
        }
    }

    /// Message 3 received: finish key agreement with the commissioner's
    /// `X` share and produce `Pake2`.
    pub fn on_pake1(passcode_w0: Scalar, passcode_w1: Scalar, pake1: &Pake1) -> Result<(Self, Pake2), SessionError> {
        let l_bytes = compute_l(&passcode_w1);
        let y = random_scalar();
        let derived = responder_finish(&passcode_w0, &l_bytes, &y, &pake1.x)?;
        let big_y_bytes = responder_share(&passcode_w0, &y);
        let h_bx = confirm_mac(&derived.ka, &pake1.x);
        Ok((
            PaseResponder { w0: passcode_w0, l_bytes, y, big_y_bytes, derived: Some(derived) },
            Pake2 { y: big_y_bytes, h_bx },
        ))
    }

    /// Message 5 received: verify the commissioner's confirmation MAC and
    /// finalize the session.
    pub fn on_pake3(&self, pake3: &Pake3) -> Result<DerivedKeys, SessionError> {
        let derived = self.derived.ok_or(SessionError::UnexpectedMessage { state: "no prior Pake1" })?;
        let expected_h_ay = confirm_mac(&derived.ka, &self.big_y_bytes);
        if !matter_crypto::ct_eq(&expected_h_ay, &pake3.h_ay) {
            return Err(SessionError::KeyConfirmationFailed);
        }
        Ok(derived)
    }

    #[cfg(test)]
    fn w0(&self) -> &Scalar {
        &self.w0
    }
}

/// `w0`/`y` are secrets; `derived` carries `Ke`/`Ka` once computed.
impl Drop for PaseResponder {
    fn drop(&mut self) {
        self.w0.zeroize();
        self.y.zeroize();
        self.derived.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::OUR_DEFAULTS;

    const TEST_PASSCODE: u32 = 20202021;

    #[test]
    fn full_five_message_handshake_converges_on_identical_keys() {
        let salt = vec![0x5A; 16];
        let iterations = 1000;
        let (w0, w1) = derive_w0_w1(TEST_PASSCODE, &salt, iterations);

        let (_request, _initiator_random) = PaseInitiator::build_request(11);
        let response = PbkdfParamResponse {
            responder_random: [0x22; 32],
            responder_session_id: 22,
            pbkdf_params: Some(PbkdfParams { iterations, salt: salt.clone() }),
            responder_session_params: OUR_DEFAULTS,
        };

        let (mut initiator, pake1) = PaseInitiator::on_param_response(TEST_PASSCODE, &response);
        let (responder, pake2) = PaseResponder::on_pake1(w0, w1, &pake1).unwrap();
        let pake3 = initiator.on_pake2(&pake2).unwrap();
        let responder_keys = responder.on_pake3(&pake3).unwrap();

        assert_eq!(initiator.session_keys().unwrap(), responder_keys);
    }

    #[test]
    fn wrong_passcode_fails_key_confirmation_not_silently() {
        let salt = vec![0x5A; 16];
        let iterations = 1000;
        let (device_w0, device_w1) = derive_w0_w1(TEST_PASSCODE, &salt, iterations);

        let response = PbkdfParamResponse {
            responder_random: [0x22; 32],
            responder_session_id: 22,
            pbkdf_params: Some(PbkdfParams { iterations, salt: salt.clone() }),
            responder_session_params: OUR_DEFAULTS,
        };
        let (mut initiator, pake1) = PaseInitiator::on_param_response(TEST_PASSCODE + 1, &response);
        let (responder, pake2) = PaseResponder::on_pake1(device_w0, device_w1, &pake1).unwrap();
        assert!(initiator.on_pake2(&pake2).is_err());
        let _ = responder.w0();
    }

    #[test]
    fn pase_window_enforces_single_in_flight_and_error_budget() {
        let now = Instant::now();
        let mut window = PaseWindow::open(now);
        window.try_begin().unwrap();
        assert!(matches!(window.try_begin(), Err(SessionError::PaseAlreadyInFlight)));
        window.record_success();
        window.try_begin().unwrap();

        window.record_success();
        for _ in 0..(PaseWindow::MAX_ERRORS - 1) {
            window.try_begin().unwrap();
            window.record_error().unwrap();
        }
        window.try_begin().unwrap();
        assert!(matches!(window.record_error(), Err(SessionError::TooManyErrors { count: 20 })));
        assert!(window.is_closed());
        assert!(matches!(window.try_begin(), Err(SessionError::TooManyErrors { .. })));
    }

    #[test]
    fn pairing_timer_expires_after_60_seconds() {
        let start = Instant::now();
        let window = PaseWindow::open(start);
        assert!(window.check_timeout(start + Duration::from_secs(59)).is_ok());
        assert!(matches!(window.check_timeout(start + Duration::from_secs(61)), Err(SessionError::PairingTimeout)));
    }
}

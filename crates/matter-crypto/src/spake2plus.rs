//! SPAKE2+ primitives for PASE (spec.md §4.D.1).
//!
//! The two curve points `M`/`N` that blind the password share must have no
//! known discrete logarithm relative to the generator in a real deployment
//! (RFC 9383 fixes them via a verifiable hash-to-curve). This workspace
//! treats elliptic-curve arithmetic as an external `Crypto` primitive
//! (spec.md §1) and derives `M`/`N` deterministically from fixed domain
//! strings instead of wiring a hash-to-curve crate; see DESIGN.md. The
//! message flow, transcript binding and key confirmation are otherwise the
//! real SPAKE2+ shape.

use crate::error::CryptoError;
use crate::hash::{hmac_sha256, sha256};
use crate::kdf::hkdf_sha256;
use p256::elliptic_curve::ff::PrimeField;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::{AffinePoint, ProjectivePoint, PublicKey, Scalar};
use rand_core::OsRng;
use zeroize::Zeroize;

fn hash_to_scalar(label: &[u8]) -> Scalar {
    let mut counter: u32 = 0;
    loop {
        let mut buf = Vec::with_capacity(label.len() + 4);
        buf.extend_from_slice(label);
        buf.extend_from_slice(&counter.to_be_bytes());
        let digest = sha256(&buf);
        let field_bytes = p256::FieldBytes::clone_from_slice(&digest);
        let candidate = Scalar::from_repr(field_bytes);
        if bool::from(candidate.is_some()) {
            return candidate.unwrap();
        }
        counter += 1;
    }
}

fn point_m() -> ProjectivePoint {
    ProjectivePoint::GENERATOR * hash_to_scalar(b"Matter PASE 2+ M")
}

fn point_n() -> ProjectivePoint {
    ProjectivePoint::GENERATOR * hash_to_scalar(b"Matter PASE 2+ N")
}

fn reduce_wide_to_scalar(wide: &[u8]) -> Scalar {
    hash_to_scalar(wide)
}

fn encode_point(point: ProjectivePoint) -> [u8; 65] {
    let affine: AffinePoint = point.to_affine();
    let public = PublicKey::from_affine(affine).expect("non-identity point is a valid public key");
    let encoded = public.to_encoded_point(false);
    let mut out = [0u8; 65];
    out.copy_from_slice(encoded.as_bytes());
    out
}

fn decode_point(bytes: &[u8]) -> Result<ProjectivePoint, CryptoError> {
    let public = PublicKey::from_sec1_bytes(bytes).map_err(|_| CryptoError::InvalidKey("malformed SPAKE2+ share"))?;
    Ok(ProjectivePoint::from(*public.as_affine()))
}

/// `w0`/`w1` derived from the commissioning passcode via PBKDF2, per
/// spec.md §4.D.1. Both sides derive these independently; the commissioner
/// from the user-entered PIN, the device ahead of time from its setup code.
pub fn derive_w0_w1(passcode: u32, salt: &[u8], iterations: u32) -> (Scalar, Scalar) {
    let mut okm = [0u8; 80];
    pbkdf2::pbkdf2_hmac::<sha2::Sha256>(&passcode.to_be_bytes(), salt, iterations, &mut okm);
    let w0 = reduce_wide_to_scalar(&okm[0..40]);
    let w1 = reduce_wide_to_scalar(&okm[40..80]);
    (w0, w1)
}

/// The device-side setup verifier `L = w1 * G`, computed once and persisted;
/// the device never needs to retain `w1` itself after this.
pub fn compute_l(w1: &Scalar) -> [u8; 65] {
    encode_point(ProjectivePoint::GENERATOR * w1)
}

/// Commissioner's `Pake1` share: `X = x*G + w0*M`.
pub fn initiator_share(w0: &Scalar, x: &Scalar) -> [u8; 65] {
    let point = ProjectivePoint::GENERATOR * x + point_m() * w0;
    encode_point(point)
}

/// Device's `Pake2` share: `Y = y*G + w0*N`.
pub fn responder_share(w0: &Scalar, y: &Scalar) -> [u8; 65] {
    let point = ProjectivePoint::GENERATOR * y + point_n() * w0;
    encode_point(point)
}

/// `Ke`/`Ka`, the SPAKE2+ session/confirmation keys (spec.md §4.D.1).
/// `Zeroize` (not `ZeroizeOnDrop`, to keep this `Copy` so the PASE state
/// machines can hand it around by value) lets the handshake structs that
/// own a long-lived copy wipe it explicitly from their own `Drop` impl.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Zeroize)]
pub struct DerivedKeys {
    pub ke: [u8; 16],
    pub ka: [u8; 16],
}

fn derive_keys(z: ProjectivePoint, v: ProjectivePoint, w0: &Scalar) -> DerivedKeys {
    let mut transcript = Vec::new();
    transcript.extend_from_slice(b"SPAKE2+");
    transcript.extend_from_slice(&encode_point(z));
    transcript.extend_from_slice(&encode_point(v));
    transcript.extend_from_slice(&w0.to_repr());
    let tt_hash = sha256(&transcript);
    let okm = hkdf_sha256(&tt_hash, &[], b"SPAKE2+ Derive", 32).expect("fixed 32-byte output");
    let mut ke = [0u8; 16];
    let mut ka = [0u8; 16];
    ke.copy_from_slice(&okm[0..16]);
    ka.copy_from_slice(&okm[16..32]);
    DerivedKeys { ke, ka }
}

/// Commissioner side: given its own ephemeral `x` and the device's `Y`,
/// compute the shared key material. `w1` is known to the commissioner (it
/// derived it from the same passcode).
pub fn initiator_finish(w0: &Scalar, w1: &Scalar, x: &Scalar, y_bytes: &[u8]) -> Result<DerivedKeys, CryptoError> {
    let y = decode_point(y_bytes)?;
    let blinded = y - point_n() * w0;
    let z = blinded * x;
    let v = blinded * w1;
    Ok(derive_keys(z, v, w0))
}

/// Device side: given its own ephemeral `y`, the setup verifier `L`, and the
/// commissioner's `X`, compute the shared key material.
pub fn responder_finish(w0: &Scalar, l_bytes: &[u8], y: &Scalar, x_bytes: &[u8]) -> Result<DerivedKeys, CryptoError> {
    let x = decode_point(x_bytes)?;
    let l = decode_point(l_bytes)?;
    let blinded = x - point_m() * w0;
    let z = blinded * y;
    let v = l * y;
    Ok(derive_keys(z, v, w0))
}

/// Key-confirmation MAC over the peer's share, keyed by `Ka`
/// (spec.md §4.D.1: `hBX`/`hAY`).
pub fn confirm_mac(ka: &[u8; 16], peer_share_bytes: &[u8]) -> [u8; 32] {
    hmac_sha256(ka, &[peer_share_bytes])
}

pub fn random_scalar() -> Scalar {
    *p256::NonZeroScalar::random(&mut OsRng)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_sides_converge_on_identical_session_keys() {
        let salt = [0x5Au8; 16];
        let (w0, w1) = derive_w0_w1(20202021, &salt, 1000);
        let l = compute_l(&w1);

        let x = random_scalar();
        let y = random_scalar();

        let big_x = initiator_share(&w0, &x);
        let big_y = responder_share(&w0, &y);

        let initiator_keys = initiator_finish(&w0, &w1, &x, &big_y).unwrap();
        let responder_keys = responder_finish(&w0, &l, &y, &big_x).unwrap();

        assert_eq!(initiator_keys, responder_keys);
        assert_ne!(initiator_keys.ke, [0u8; 16]);
    }

    #[test]
    fn wrong_passcode_yields_different_keys() {
        let salt = [0x5Au8; 16];
        let (w0_right, w1_right) = derive_w0_w1(20202021, &salt, 1000);
        let (w0_wrong, _w1_wrong) = derive_w0_w1(11111111, &salt, 1000);
        let l = compute_l(&w1_right);

        let x = random_scalar();
        let y = random_scalar();
        let big_x = initiator_share(&w0_wrong, &x);
        let big_y = responder_share(&w0_right, &y);

        // The responder still derives from its own correct w0/L; a bad
        // commissioner-side passcode makes the two finishes disagree.
        let initiator_keys = initiator_finish(&w0_wrong, &w1_right, &x, &big_y).unwrap();
        let responder_keys = responder_finish(&w0_right, &l, &y, &big_x).unwrap();
        assert_ne!(initiator_keys, responder_keys);
    }

    #[test]
    fn confirmation_mac_is_sensitive_to_the_share_it_covers() {
        let ka = [7u8; 16];
        let share_a = [1u8; 65];
        let share_b = [2u8; 65];
        assert_ne!(confirm_mac(&ka, &share_a), confirm_mac(&ka, &share_b));
    }
}

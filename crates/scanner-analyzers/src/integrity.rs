//! # Signature/Integrity Analyzer
//!
//! Verifies archive provenance (spec §4.3.6): the tarball's own digest
//! against the digest the registry declared for that version, and, when a
//! detached signature is present, the signature itself against the
//! publisher's key.

use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use scanner_core::{Fingerprint, PackageRef, Severity, Threat, ThreatKind};

/// Minimum key length accepted for a detached signature. Ed25519 keys are
/// fixed at 32 bytes; anything shorter cannot be a genuine key and is
/// treated as intentionally weakened.
const MIN_KEY_LENGTH: usize = 32;

/// Verifies archive digests and detached signatures.
pub struct IntegrityAnalyzer;

impl IntegrityAnalyzer {
    /// Compares the archive's computed digest against the digest the
    /// registry declared for this version.
    #[must_use]
    pub fn verify_digest(package: &PackageRef, computed: &Fingerprint, declared: &str) -> Option<Threat> {
        if computed.0.eq_ignore_ascii_case(declared) {
            return None;
        }
        Some(Threat::new(
            ThreatKind::IntegrityMismatch,
            Severity::High,
            0.8,
            format!("archive digest {} does not match registry-declared digest {declared}", computed.0),
            package.clone(),
        ))
    }

    /// Verifies a detached signature over `payload` against `public_key`.
    /// Returns `None` when the signature is genuinely valid; a weak or
    /// malformed key is reported distinctly from a signature that simply
    /// fails to verify.
    #[must_use]
    pub fn verify_signature(
        package: &PackageRef,
        payload: &[u8],
        signature_bytes: &[u8],
        public_key_bytes: &[u8],
    ) -> Option<Threat> {
        if public_key_bytes.len() < MIN_KEY_LENGTH {
            return Some(Threat::new(
                ThreatKind::WeakKey,
                Severity::High,
                0.7,
                format!("publisher key is {} bytes, shorter than the expected {MIN_KEY_LENGTH}", public_key_bytes.len()),
                package.clone(),
            ));
        }

        let key: [u8; 32] = match public_key_bytes.try_into() {
            Ok(bytes) => bytes,
            Err(_) => {
                return Some(Threat::new(
                    ThreatKind::InvalidSignature,
                    Severity::High,
                    0.75,
                    "publisher key is not a valid 32-byte ed25519 key".to_string(),
                    package.clone(),
                ))
            }
        };

        let sig: [u8; 64] = match signature_bytes.try_into() {
            Ok(bytes) => bytes,
            Err(_) => {
                return Some(Threat::new(
                    ThreatKind::InvalidSignature,
                    Severity::High,
                    0.75,
                    "detached signature is not a valid 64-byte ed25519 signature".to_string(),
                    package.clone(),
                ))
            }
        };

        let verifying_key = match VerifyingKey::from_bytes(&key) {
            Ok(key) => key,
            Err(err) => {
                return Some(Threat::new(
                    ThreatKind::InvalidSignature,
                    Severity::High,
                    0.75,
                    format!("publisher key is not a valid curve point: {err}"),
                    package.clone(),
                ))
            }
        };
        let signature = Signature::from_bytes(&sig);

        match verifying_key.verify(payload, &signature) {
            Ok(()) => None,
            Err(err) => Some(Threat::new(
                ThreatKind::InvalidSignature,
                Severity::High,
                0.85,
                format!("detached signature does not verify against the publisher key: {err}"),
                package.clone(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};
    use rand::rngs::OsRng;

    fn package() -> PackageRef {
        PackageRef::named("left-pad", "1.3.0")
    }

    #[test]
    fn matching_digests_produce_no_finding() {
        let computed = Fingerprint::of_bytes(b"tarball contents");
        let declared = computed.0.clone();
        assert!(IntegrityAnalyzer::verify_digest(&package(), &computed, &declared).is_none());
    }

    #[test]
    fn mismatched_digests_are_flagged() {
        let computed = Fingerprint::of_bytes(b"tarball contents");
        let threat = IntegrityAnalyzer::verify_digest(&package(), &computed, "deadbeef").unwrap();
        assert_eq!(threat.kind, ThreatKind::IntegrityMismatch);
        assert_eq!(threat.severity, Severity::High);
    }

    #[test]
    fn valid_signature_verifies() {
        let signing_key = SigningKey::generate(&mut OsRng);
        let payload = b"package contents";
        let signature = signing_key.sign(payload);
        let threat = IntegrityAnalyzer::verify_signature(
            &package(),
            payload,
            &signature.to_bytes(),
            signing_key.verifying_key().as_bytes(),
        );
        assert!(threat.is_none());
    }

    #[test]
    fn tampered_payload_fails_verification() {
        let signing_key = SigningKey::generate(&mut OsRng);
        let signature = signing_key.sign(b"original contents");
        let threat = IntegrityAnalyzer::verify_signature(
            &package(),
            b"tampered contents",
            &signature.to_bytes(),
            signing_key.verifying_key().as_bytes(),
        )
        .unwrap();
        assert_eq!(threat.kind, ThreatKind::InvalidSignature);
    }

    #[test]
    fn undersized_key_is_a_weak_key_finding() {
        let threat = IntegrityAnalyzer::verify_signature(&package(), b"x", &[0u8; 64], &[1, 2, 3]).unwrap();
        assert_eq!(threat.kind, ThreatKind::WeakKey);
    }
}

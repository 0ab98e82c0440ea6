// SPDX-License-Identifier: MIT OR Apache-2.0
//! Shamir secret sharing over the P-256 scalar field.
//!
//! The secret is a random scalar `s`. Splitting draws a random polynomial
//! `f` of degree `threshold - 1` with `f(0) = s` and hands out evaluations
//! at the x-coordinates `1..=shares`. Any `threshold` distinct shares
//! recover `s` by Lagrange interpolation at zero. Splitting also produces
//! Feldman-style commitments to the polynomial coefficients so individual
//! shares can be checked without completing a reconstruction.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use p256::elliptic_curve::{Field, PrimeField};
use p256::{FieldBytes, ProjectivePoint, Scalar};
use rand::rngs::OsRng;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{Result, VaultError};

/// Byte length of an encoded P-256 scalar.
pub const SCALAR_SIZE: usize = 32;

/// One share of a split secret: a point `(id, value)` on the polynomial.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Share {
    id: Scalar,
    value: Scalar,
}

impl Share {
    /// External form: `base64(value) "#" base64(id)`.
    #[must_use]
    pub fn encode(&self) -> String {
        format!(
            "{}#{}",
            BASE64.encode(self.value.to_repr()),
            BASE64.encode(self.id.to_repr())
        )
    }

    /// Parse the external form back into scalars.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::InvalidShare`] on any malformed input.
    pub fn decode(encoded: &str) -> Result<Self> {
        let (value_b64, id_b64) = encoded.split_once('#').ok_or(VaultError::InvalidShare)?;

        let value = scalar_from_b64(value_b64)?;
        let id = scalar_from_b64(id_b64)?;
        if bool::from(id.is_zero()) {
            return Err(VaultError::InvalidShare);
        }

        Ok(Self { id, value })
    }
}

fn scalar_from_b64(encoded: &str) -> Result<Scalar> {
    let bytes = BASE64
        .decode(encoded)
        .map_err(|_| VaultError::InvalidShare)?;
    if bytes.len() != SCALAR_SIZE {
        return Err(VaultError::InvalidShare);
    }
    let repr = FieldBytes::clone_from_slice(&bytes);
    Option::<Scalar>::from(Scalar::from_repr(repr)).ok_or(VaultError::InvalidShare)
}

/// Commitments `G * a_j` to the split polynomial's coefficients.
///
/// Held in memory only; a restarted process falls back on wrap-key
/// authentication to detect a wrong share set.
#[derive(Clone)]
pub struct Commitment {
    points: Vec<ProjectivePoint>,
}

impl Commitment {
    /// Check `G * value == sum_j id^j * C_j` for one share.
    #[must_use]
    pub fn verify(&self, share: &Share) -> bool {
        let mut acc = ProjectivePoint::IDENTITY;
        let mut power = Scalar::ONE;
        for point in &self.points {
            acc += *point * power;
            power *= share.id;
        }
        ProjectivePoint::GENERATOR * share.value == acc
    }
}

/// Draw a fresh uniformly random secret scalar.
#[must_use]
pub fn random_secret() -> Scalar {
    Scalar::random(&mut OsRng)
}

/// Split `secret` into `shares` pieces, any `threshold` of which recover it.
///
/// X-coordinates are the scalars `1..=shares`, so share bytes are stable
/// across processes.
///
/// # Errors
///
/// Returns [`VaultError::BadConfig`] unless `1 <= threshold <= shares`.
pub fn split(secret: &Scalar, shares: u8, threshold: u8) -> Result<(Vec<Share>, Commitment)> {
    if shares == 0 || threshold == 0 || threshold > shares {
        return Err(VaultError::BadConfig(format!(
            "threshold must satisfy 1 <= t <= n, got t={threshold} n={shares}"
        )));
    }

    let mut coefficients = Vec::with_capacity(threshold as usize);
    coefficients.push(*secret);
    for _ in 1..threshold {
        coefficients.push(Scalar::random(&mut OsRng));
    }

    let commitment = Commitment {
        points: coefficients
            .iter()
            .map(|c| ProjectivePoint::GENERATOR * c)
            .collect(),
    };

    let out = (1..=shares)
        .map(|i| {
            let id = Scalar::from(u64::from(i));
            Share {
                id,
                value: eval(&coefficients, &id),
            }
        })
        .collect();

    for c in &mut coefficients {
        c.zeroize();
    }

    Ok((out, commitment))
}

/// Evaluate the polynomial at `x` by Horner's rule.
fn eval(coefficients: &[Scalar], x: &Scalar) -> Scalar {
    let mut acc = Scalar::ZERO;
    for coefficient in coefficients.iter().rev() {
        acc = acc * x + coefficient;
    }
    acc
}

/// Recover the secret from `threshold` or more distinct shares by Lagrange
/// interpolation at zero.
///
/// # Errors
///
/// Returns [`VaultError::InvalidShare`] for an empty set, duplicate
/// x-coordinates, or a zero x-coordinate. Fewer than `threshold` distinct
/// shares reconstruct an unrelated scalar rather than an error; callers
/// detect that when the recovered key fails to open anything.
pub fn combine(shares: &[Share]) -> Result<Scalar> {
    if shares.is_empty() {
        return Err(VaultError::InvalidShare);
    }

    for (i, share) in shares.iter().enumerate() {
        if bool::from(share.id.is_zero()) {
            return Err(VaultError::InvalidShare);
        }
        if shares[..i].iter().any(|other| other.id == share.id) {
            return Err(VaultError::InvalidShare);
        }
    }

    let mut secret = Scalar::ZERO;
    for (j, share) in shares.iter().enumerate() {
        let mut numerator = Scalar::ONE;
        let mut denominator = Scalar::ONE;
        for (k, other) in shares.iter().enumerate() {
            if k == j {
                continue;
            }
            numerator *= other.id;
            denominator *= other.id - share.id;
        }
        let inverse =
            Option::<Scalar>::from(denominator.invert()).ok_or(VaultError::InvalidShare)?;
        secret += share.value * numerator * inverse;
    }

    Ok(secret)
}

/// Encode a scalar for external use (root token, wrap key bytes).
#[must_use]
pub fn scalar_bytes(scalar: &Scalar) -> [u8; SCALAR_SIZE] {
    scalar.to_repr().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_secret() -> Scalar {
        Scalar::from(0xDEAD_BEEF_u64)
    }

    #[test]
    fn test_split_and_combine_roundtrip() {
        let secret = random_secret();
        let (shares, _) = split(&secret, 5, 3).unwrap();
        assert_eq!(shares.len(), 5);

        let recovered = combine(&shares[..3]).unwrap();
        assert_eq!(recovered, secret);
    }

    #[test]
    fn test_combine_with_all_shares() {
        let secret = random_secret();
        let (shares, _) = split(&secret, 5, 3).unwrap();
        assert_eq!(combine(&shares).unwrap(), secret);
    }

    #[test]
    fn test_combine_with_different_subsets() {
        let secret = random_secret();
        let (shares, _) = split(&secret, 5, 3).unwrap();

        for combo in [[0usize, 1, 2], [0, 2, 4], [1, 3, 4]] {
            let subset: Vec<_> = combo.iter().map(|&i| shares[i].clone()).collect();
            assert_eq!(combine(&subset).unwrap(), secret);
        }
    }

    #[test]
    fn test_too_few_shares_recover_garbage() {
        let secret = random_secret();
        let (shares, _) = split(&secret, 5, 3).unwrap();

        let recovered = combine(&shares[..2]).unwrap();
        assert_ne!(recovered, secret);
    }

    #[test]
    fn test_threshold_of_one() {
        let secret = test_secret();
        let (shares, commitment) = split(&secret, 3, 1).unwrap();

        for share in &shares {
            assert_eq!(combine(std::slice::from_ref(share)).unwrap(), secret);
            assert!(commitment.verify(share));
        }
    }

    #[test]
    fn test_bad_parameters_rejected() {
        let secret = test_secret();
        assert!(split(&secret, 0, 0).is_err());
        assert!(split(&secret, 5, 0).is_err());
        assert!(split(&secret, 3, 5).is_err());
    }

    #[test]
    fn test_duplicate_shares_rejected() {
        let secret = test_secret();
        let (shares, _) = split(&secret, 3, 2).unwrap();

        let dupes = vec![shares[0].clone(), shares[0].clone()];
        assert!(matches!(combine(&dupes), Err(VaultError::InvalidShare)));
    }

    #[test]
    fn test_empty_share_set_rejected() {
        assert!(matches!(combine(&[]), Err(VaultError::InvalidShare)));
    }

    #[test]
    fn test_commitment_accepts_real_shares() {
        let secret = random_secret();
        let (shares, commitment) = split(&secret, 5, 3).unwrap();

        for share in &shares {
            assert!(commitment.verify(share));
        }
    }

    #[test]
    fn test_commitment_rejects_forged_share() {
        let secret = random_secret();
        let (shares, commitment) = split(&secret, 5, 3).unwrap();

        let forged = Share {
            id: shares[0].id,
            value: shares[0].value + Scalar::ONE,
        };
        assert!(!commitment.verify(&forged));
    }

    #[test]
    fn test_commitment_rejects_share_of_other_secret() {
        let (_, commitment) = split(&random_secret(), 5, 3).unwrap();
        let (other_shares, _) = split(&random_secret(), 5, 3).unwrap();

        assert!(!commitment.verify(&other_shares[0]));
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let secret = random_secret();
        let (shares, _) = split(&secret, 5, 3).unwrap();

        let decoded: Vec<Share> = shares
            .iter()
            .map(|s| Share::decode(&s.encode()).unwrap())
            .collect();
        assert_eq!(combine(&decoded[1..4]).unwrap(), secret);
    }

    #[test]
    fn test_encoded_form_has_two_fields() {
        let (shares, _) = split(&test_secret(), 2, 2).unwrap();
        let encoded = shares[0].encode();
        assert_eq!(encoded.matches('#').count(), 1);

        let (value, id) = encoded.split_once('#').unwrap();
        assert_eq!(BASE64.decode(value).unwrap().len(), SCALAR_SIZE);
        assert_eq!(BASE64.decode(id).unwrap().len(), SCALAR_SIZE);
    }

    #[test]
    fn test_decode_garbage_rejected() {
        for bad in [
            "",
            "no-separator",
            "AAAA#",
            "#AAAA",
            "!!!#!!!",
            "dG9vc2hvcnQ=#dG9vc2hvcnQ=",
        ] {
            assert!(
                matches!(Share::decode(bad), Err(VaultError::InvalidShare)),
                "expected InvalidShare for {bad:?}"
            );
        }
    }

    #[test]
    fn test_decode_zero_id_rejected() {
        let zero = BASE64.encode([0u8; SCALAR_SIZE]);
        let one = BASE64.encode(scalar_bytes(&Scalar::ONE));
        let encoded = format!("{one}#{zero}");
        assert!(matches!(
            Share::decode(&encoded),
            Err(VaultError::InvalidShare)
        ));
    }

    #[test]
    fn test_share_ids_are_distinct_and_stable() {
        let (a, _) = split(&test_secret(), 5, 2).unwrap();
        let (b, _) = split(&test_secret(), 5, 2).unwrap();

        for i in 0..5 {
            assert_eq!(a[i].id, b[i].id);
            assert_eq!(a[i].id, Scalar::from(i as u64 + 1));
        }
    }

    #[test]
    fn test_different_secrets_reconstruct_differently() {
        let s1 = random_secret();
        let s2 = random_secret();
        let (shares1, _) = split(&s1, 3, 2).unwrap();
        let (shares2, _) = split(&s2, 3, 2).unwrap();

        assert_ne!(combine(&shares1[..2]).unwrap(), combine(&shares2[..2]).unwrap());
    }

    #[test]
    fn test_scalar_bytes_roundtrip() {
        let secret = random_secret();
        let bytes = scalar_bytes(&secret);
        let repr = FieldBytes::clone_from_slice(&bytes);
        let back = Option::<Scalar>::from(Scalar::from_repr(repr)).unwrap();
        assert_eq!(back, secret);
    }
}

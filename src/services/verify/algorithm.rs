use jsonwebtoken::Algorithm;

use super::VerifyError;

/// Asymmetric algorithms only. `none` never reaches here since the header fails to decode.
pub const ACCEPTED_ALGORITHMS: &[Algorithm] = &[
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
    Algorithm::ES256,
    Algorithm::ES384,
    Algorithm::EdDSA,
];

pub fn ensure_accepted(alg: Algorithm) -> Result<(), VerifyError> {
    if ACCEPTED_ALGORITHMS.contains(&alg) {
        Ok(())
    } else {
        Err(VerifyError::UnsupportedAlgorithm(alg))
    }
}

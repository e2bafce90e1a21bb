/*++

Licensed under the Apache-2.0 license.

File Name:

    mod.rs

Abstract:

    File contains the message generation / verification strategies that
    plug into the DH session state machine.

--*/

mod lav1;
mod lav2;

pub use lav1::LaV1;
pub use lav2::LaV2;

use crate::crypto::{ct_eq, CmacTag, DhEnv, Ec256PublicKey, Key128, Sha256Digest};
use crate::kdf::AES_CMAC_KDF_ID;
use crate::msg::{DhMsg1, DhMsg2, DhMsg3};
use crate::report::ReportData;
use la_error::{LaError, LaResult};
use log::debug;

/// Local attestation protocol generation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LaVersion {
    V1,
    V2,
}

/// Message 2 verifiers in the order the responder tries them.
///
/// LAv1 goes first so that a KDF-ID mismatch is reported before the LAv2
/// fallback gets a chance to run. When every verifier rejects the message the
/// LAv1 error is the one reported, so a damaged LAv2 message 2 surfaces as
/// `KDF_MISMATCH`: its report data carries no AES-CMAC KDF-ID.
pub const MSG2_VERIFIERS: [LaVersion; 2] = [LaVersion::V1, LaVersion::V2];

/// Generator / verifier set of one protocol generation.
///
/// The session state machine is written once against this trait; the
/// generation is picked by the type passed in.
pub trait LaProtocol {
    const VERSION: LaVersion;

    /// Build message 2 (initiator).
    ///
    /// # Arguments
    ///
    /// * `env` - Environment
    /// * `msg1` - Message 1 received from the responder
    /// * `g_b` - Initiator ephemeral public key
    /// * `smk` - Session MAC key
    fn generate_msg2<E: DhEnv>(
        env: &mut E,
        msg1: &DhMsg1,
        g_b: &Ec256PublicKey,
        smk: &Key128,
    ) -> LaResult<DhMsg2>;

    /// Verify message 2 (responder).
    ///
    /// # Arguments
    ///
    /// * `env` - Environment
    /// * `msg2` - Message 2 received from the initiator
    /// * `g_a` - Responder ephemeral public key
    /// * `smk` - Session MAC key
    fn verify_msg2<E: DhEnv>(
        env: &mut E,
        msg2: &DhMsg2,
        g_a: &Ec256PublicKey,
        smk: &Key128,
    ) -> LaResult<()>;

    /// Build message 3 (responder).
    ///
    /// # Arguments
    ///
    /// * `env` - Environment
    /// * `msg2` - Verified message 2
    /// * `g_a` - Responder ephemeral public key
    /// * `smk` - Session MAC key
    /// * `additional_prop` - Opaque bytes to carry in message 3
    fn generate_msg3<E: DhEnv>(
        env: &mut E,
        msg2: &DhMsg2,
        g_a: &Ec256PublicKey,
        smk: &Key128,
        additional_prop: &[u8],
    ) -> LaResult<DhMsg3>;

    /// Verify message 3 (initiator).
    ///
    /// # Arguments
    ///
    /// * `env` - Environment
    /// * `msg3` - Message 3 received from the responder
    /// * `g_a` - Responder ephemeral public key
    /// * `g_b` - Initiator ephemeral public key
    /// * `smk` - Session MAC key
    fn verify_msg3<E: DhEnv>(
        env: &mut E,
        msg3: &DhMsg3,
        g_a: &Ec256PublicKey,
        g_b: &Ec256PublicKey,
        smk: &Key128,
    ) -> LaResult<()>;
}

impl LaVersion {
    pub(crate) fn verify_msg2<E: DhEnv>(
        self,
        env: &mut E,
        msg2: &DhMsg2,
        g_a: &Ec256PublicKey,
        smk: &Key128,
    ) -> LaResult<()> {
        match self {
            LaVersion::V1 => LaV1::verify_msg2(env, msg2, g_a, smk),
            LaVersion::V2 => LaV2::verify_msg2(env, msg2, g_a, smk),
        }
    }

    pub(crate) fn generate_msg3<E: DhEnv>(
        self,
        env: &mut E,
        msg2: &DhMsg2,
        g_a: &Ec256PublicKey,
        smk: &Key128,
        additional_prop: &[u8],
    ) -> LaResult<DhMsg3> {
        match self {
            LaVersion::V1 => LaV1::generate_msg3(env, msg2, g_a, smk, additional_prop),
            LaVersion::V2 => LaV2::generate_msg3(env, msg2, g_a, smk, additional_prop),
        }
    }
}

/// Try every message 2 verifier in order.
///
/// # Returns
///
/// * `LaVersion` - Generation of the first verifier that accepted the
///   message. If none did, the error of the first verifier is returned.
pub(crate) fn verify_msg2_any<E: DhEnv>(
    env: &mut E,
    msg2: &DhMsg2,
    g_a: &Ec256PublicKey,
    smk: &Key128,
) -> LaResult<LaVersion> {
    let mut first_err = None;
    for version in MSG2_VERIFIERS {
        match version.verify_msg2(env, msg2, g_a, smk) {
            Ok(()) => return Ok(version),
            Err(err) => {
                debug!("msg2 rejected by {version:?} verifier: {err}");
                first_err.get_or_insert(err);
            }
        }
    }
    Err(first_err.unwrap_or(LaError::UNEXPECTED))
}

/// Compare `mac` against the CMAC of `parts` in constant time.
pub(crate) fn verify_cmac128<E: DhEnv>(
    env: &mut E,
    smk: &Key128,
    parts: &[&[u8]],
    mac: &CmacTag,
) -> LaResult<()> {
    let expected = env.cmac128(smk, parts)?;
    if !ct_eq(&expected, mac) {
        return Err(LaError::MAC_MISMATCH);
    }
    Ok(())
}

/// Report data = digest || 2-byte little-endian KDF-ID || zero padding
pub(crate) fn kdf_bound_report_data(digest: &Sha256Digest) -> ReportData {
    let mut data = ReportData::with_prefix(digest);
    data.0[digest.len()..digest.len() + 2].copy_from_slice(&AES_CMAC_KDF_ID.to_le_bytes());
    data
}

/// KDF-ID embedded in report data built by `kdf_bound_report_data`
pub(crate) fn report_data_kdf_id(data: &ReportData) -> u16 {
    let at = core::mem::size_of::<Sha256Digest>();
    u16::from_le_bytes([data.0[at], data.0[at + 1]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kdf_bound_report_data() {
        let digest = [0xab; 32];
        let data = kdf_bound_report_data(&digest);
        assert_eq!(&data.0[..32], &digest);
        assert_eq!(&data.0[32..34], &[0x01, 0x00]);
        assert!(data.0[34..].iter().all(|&b| b == 0));
        assert_eq!(report_data_kdf_id(&data), AES_CMAC_KDF_ID);
    }

    #[test]
    fn test_verifier_order() {
        assert_eq!(MSG2_VERIFIERS, [LaVersion::V1, LaVersion::V2]);
    }

    #[test]
    fn test_lav2_report_data_has_no_kdf_id() {
        let data = crate::proto_spec::LAV2_PROTO_SPEC.to_report_data();
        assert_ne!(report_data_kdf_id(&data), AES_CMAC_KDF_ID);
    }
}

/*++

Licensed under the Apache-2.0 license.

File Name:

    crypto.rs

Abstract:

    File contains the key types and the primitive / report provider
    interfaces the local attestation handshake runs on.

--*/

use crate::report::{Report, ReportData, TargetInfo};
use la_error::LaResult;
use subtle::ConstantTimeEq;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// ECC-256 coordinate size in bytes
pub const EC256_COORD_SIZE: usize = 32;

/// SHA-256 digest size in bytes
pub const SHA256_DIGEST_SIZE: usize = 32;

/// AES-CMAC-128 key and tag size in bytes
pub const CMAC_SIZE: usize = 16;

/// SHA-256 Digest
pub type Sha256Digest = [u8; SHA256_DIGEST_SIZE];

/// AES-CMAC-128 Tag
pub type CmacTag = [u8; CMAC_SIZE];

/// ECC-256 public key. Coordinates are little-endian.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable, Zeroize)]
pub struct Ec256PublicKey {
    /// X coordinate
    pub gx: [u8; EC256_COORD_SIZE],

    /// Y coordinate
    pub gy: [u8; EC256_COORD_SIZE],
}

/// ECC-256 private scalar, little-endian
#[derive(Clone, Default, Zeroize, ZeroizeOnDrop)]
pub struct Ec256PrivateKey(pub [u8; EC256_COORD_SIZE]);

/// ECDH shared secret: little-endian x coordinate of the shared point
#[derive(Clone, Default, Zeroize, ZeroizeOnDrop)]
pub struct Ec256SharedSecret(pub [u8; EC256_COORD_SIZE]);

/// 128-bit symmetric key
#[derive(Clone, Default, Zeroize, ZeroizeOnDrop)]
#[cfg_attr(test, derive(PartialEq))]
pub struct Key128(pub [u8; CMAC_SIZE]);

impl core::fmt::Debug for Ec256PrivateKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("Ec256PrivateKey(..)")
    }
}

impl core::fmt::Debug for Ec256SharedSecret {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("Ec256SharedSecret(..)")
    }
}

impl core::fmt::Debug for Key128 {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("Key128(..)")
    }
}

impl Ec256PrivateKey {
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }
}

impl Ec256SharedSecret {
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }
}

impl Key128 {
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }
}

/// Constant time comparison of two byte strings
pub fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

/// Cryptographic primitives used by the handshake.
///
/// Multi-part inputs are hashed / MAC'd as the concatenation of the parts.
pub trait LaCrypto {
    /// Calculate the SHA-256 digest of the concatenated `parts`
    fn sha256(&mut self, parts: &[&[u8]]) -> LaResult<Sha256Digest>;

    /// Calculate the AES-CMAC-128 tag of the concatenated `parts`
    fn cmac128(&mut self, key: &Key128, parts: &[&[u8]]) -> LaResult<CmacTag>;

    /// Generate a fresh ECC-256 key pair from a cryptographically secure
    /// random source
    fn ecc256_key_pair(&mut self) -> LaResult<(Ec256PrivateKey, Ec256PublicKey)>;

    /// Compute the ECDH shared secret. Fails if `peer` is not on the curve.
    fn ecc256_shared_dhkey(
        &mut self,
        priv_key: &Ec256PrivateKey,
        peer: &Ec256PublicKey,
    ) -> LaResult<Ec256SharedSecret>;
}

/// Hardware report services of the calling code.
pub trait ReportProvider {
    /// Create a report binding `data` to the identity of the caller.
    ///
    /// The report is addressed at `target`; `None` addresses it at the
    /// caller itself.
    fn create_report(&mut self, target: Option<&TargetInfo>, data: &ReportData)
        -> LaResult<Report>;

    /// Verify a report was produced by genuine hardware and addressed at the
    /// caller.
    fn verify_report(&mut self, report: &Report) -> LaResult<()>;
}

/// Everything a handshake step needs from its environment.
pub trait DhEnv: LaCrypto + ReportProvider {}

impl<T: LaCrypto + ReportProvider> DhEnv for T {}

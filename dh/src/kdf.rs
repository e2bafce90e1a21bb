/*++

Licensed under the Apache-2.0 license.

File Name:

    kdf.rs

Abstract:

    AES-CMAC entropy extraction and key derivation used to turn the ECDH
    shared secret into the session MAC key and the application key.

--*/

use crate::crypto::{Ec256SharedSecret, Key128, LaCrypto};
use arrayvec::ArrayVec;
use la_error::{LaError, LaResult};

/// 2-byte little-endian KDF-ID: AES-CMAC Entropy Extraction and Key Derivation
pub const AES_CMAC_KDF_ID: u16 = 0x0001;

/// Label of the session MAC key
pub const SMK_LABEL: &[u8] = b"SMK";

/// Label of the application encryption key
pub const AEK_LABEL: &[u8] = b"AEK";

const MAX_LABEL_SIZE: usize = 32;

/// Counter, separator and 16-bit output length framing the label
const DERIVATION_OVERHEAD: usize = 4;

/// Output key length in bits, little-endian
const KEY_LEN_BITS: [u8; 2] = 128u16.to_le_bytes();

/// Derive a 128-bit key from an ECDH shared secret
///
/// # Arguments
///
/// * `crypto` - Primitive provider
/// * `shared_key` - ECDH shared secret
/// * `label` - Label of the key to derive
///
/// # Returns
///
/// * `Key128` - CMAC(CMAC(0, shared_key), 0x01 || label || 0x00 || 0x0080)
pub fn derive_key<C: LaCrypto + ?Sized>(
    crypto: &mut C,
    shared_key: &Ec256SharedSecret,
    label: &[u8],
) -> LaResult<Key128> {
    if label.len() > MAX_LABEL_SIZE {
        return Err(LaError::KDF_LABEL_TOO_LONG);
    }

    let zero_key = Key128::default();
    let kdk = Key128(crypto.cmac128(&zero_key, &[&shared_key.0])?);

    let mut input = ArrayVec::<u8, { MAX_LABEL_SIZE + DERIVATION_OVERHEAD }>::new();
    input.push(0x01);
    input
        .try_extend_from_slice(label)
        .map_err(|_| LaError::KDF_LABEL_TOO_LONG)?;
    input.push(0x00);
    input
        .try_extend_from_slice(&KEY_LEN_BITS)
        .map_err(|_| LaError::KDF_LABEL_TOO_LONG)?;

    Ok(Key128(crypto.cmac128(&kdk, &[input.as_slice()])?))
}

/*++

Licensed under the Apache-2.0 license.

File Name:

    soft_crypto.rs

Abstract:

    File contains a software implementation of the handshake primitives:
    SHA-256, AES-CMAC-128 and P-256 ECDH.

--*/

use crate::crypto::{
    CmacTag, Ec256PrivateKey, Ec256PublicKey, Ec256SharedSecret, Key128, LaCrypto, Sha256Digest,
    EC256_COORD_SIZE,
};
use aes::Aes128;
use cmac::{Cmac, Mac};
use la_error::{LaError, LaResult};
use p256::elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint};
use p256::{EncodedPoint, FieldBytes, PublicKey, SecretKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

/// Reverse the byte order of a 32-byte value
fn swap_endianness(src: &[u8]) -> [u8; EC256_COORD_SIZE] {
    let mut dst = [0u8; EC256_COORD_SIZE];
    for (d, s) in dst.iter_mut().zip(src.iter().rev()) {
        *d = *s;
    }
    dst
}

impl TryFrom<&EncodedPoint> for Ec256PublicKey {
    type Error = LaError;

    fn try_from(point: &EncodedPoint) -> Result<Self, Self::Error> {
        let x = point.x().ok_or(LaError::CRYPTO_ECDH_INVALID_POINT)?;
        let y = point.y().ok_or(LaError::CRYPTO_ECDH_INVALID_POINT)?;
        Ok(Self {
            gx: swap_endianness(x),
            gy: swap_endianness(y),
        })
    }
}

impl TryFrom<&Ec256PublicKey> for PublicKey {
    type Error = LaError;

    fn try_from(key: &Ec256PublicKey) -> Result<Self, Self::Error> {
        let x = swap_endianness(&key.gx);
        let y = swap_endianness(&key.gy);
        let point = EncodedPoint::from_affine_coordinates(
            FieldBytes::from_slice(&x),
            FieldBytes::from_slice(&y),
            false,
        );
        Option::<PublicKey>::from(PublicKey::from_encoded_point(&point))
            .ok_or(LaError::CRYPTO_ECDH_INVALID_POINT)
    }
}

/// Software primitive provider
#[derive(Debug, Default, Clone, Copy)]
pub struct SoftCrypto;

impl SoftCrypto {
    pub fn new() -> Self {
        Self
    }
}

impl LaCrypto for SoftCrypto {
    fn sha256(&mut self, parts: &[&[u8]]) -> LaResult<Sha256Digest> {
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update(part);
        }
        let mut digest = Sha256Digest::default();
        digest.copy_from_slice(&hasher.finalize());
        Ok(digest)
    }

    fn cmac128(&mut self, key: &Key128, parts: &[&[u8]]) -> LaResult<CmacTag> {
        let mut mac = <Cmac<Aes128> as Mac>::new_from_slice(&key.0)
            .map_err(|_| LaError::CRYPTO_CMAC_FAILURE)?;
        for part in parts {
            mac.update(part);
        }
        let mut tag = CmacTag::default();
        tag.copy_from_slice(&mac.finalize().into_bytes());
        Ok(tag)
    }

    fn ecc256_key_pair(&mut self) -> LaResult<(Ec256PrivateKey, Ec256PublicKey)> {
        let secret = SecretKey::random(&mut OsRng);
        let point = secret.public_key().to_encoded_point(false);
        let pub_key = Ec256PublicKey::try_from(&point)
            .map_err(|_| LaError::CRYPTO_ECC_KEYGEN_FAILURE)?;

        let mut scalar = secret.to_bytes();
        let priv_key = Ec256PrivateKey(swap_endianness(&scalar));
        scalar.as_mut_slice().zeroize();

        Ok((priv_key, pub_key))
    }

    fn ecc256_shared_dhkey(
        &mut self,
        priv_key: &Ec256PrivateKey,
        peer: &Ec256PublicKey,
    ) -> LaResult<Ec256SharedSecret> {
        let peer = PublicKey::try_from(peer)?;

        let mut scalar = swap_endianness(&priv_key.0);
        let secret = SecretKey::from_slice(&scalar);
        scalar.zeroize();
        let secret = secret.map_err(|_| LaError::CRYPTO_ECC_INVALID_PRIV_KEY)?;

        let shared = p256::ecdh::diffie_hellman(secret.to_nonzero_scalar(), peer.as_affine());
        Ok(Ec256SharedSecret(swap_endianness(
            shared.raw_secret_bytes().as_slice(),
        )))
    }
}

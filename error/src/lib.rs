/*++

Licensed under the Apache-2.0 license.

File Name:

    lib.rs

Abstract:

    File contains API and macros used by the local attestation crates for
    error handling.

--*/
#![cfg_attr(not(feature = "std"), no_std)]
use core::convert::From;
use core::fmt;
use core::num::{NonZeroU32, TryFromIntError};

/// Local Attestation Error Type
/// Derives debug, copy, clone, eq, and partial eq
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct LaError(pub NonZeroU32);

/// Mask selecting the component bits of an error code.
const COMPONENT_MASK: u32 = 0xffff_0000;

/// Component of the errors every caller may observe.
const PUBLIC_COMPONENT: u32 = 0x0000_0000;

/// Macro to define error constants ensuring uniqueness
///
/// This macro takes a list of (name, value, doc) tuples and generates
/// constant definitions for each error code, plus a `name()` lookup.
#[macro_export]
macro_rules! define_error_constants {
    ($(($name:ident, $value:expr, $doc:expr)),* $(,)?) => {
        $(
            #[doc = $doc]
            pub const $name: LaError = LaError::new_const($value);
        )*

        /// Returns the symbolic name of the error, if it is a known code.
        pub fn name(&self) -> Option<&'static str> {
            $(
                if self.0.get() == $value {
                    return Some(stringify!($name));
                }
            )*
            None
        }

        #[cfg(test)]
        /// Returns a vector of all defined error constants for testing uniqueness
        pub fn all_constants() -> Vec<(&'static str, u32)> {
            vec![
                $(
                    (stringify!($name), $value),
                )*
            ]
        }
    };
}

impl LaError {
    /// Create an error; intended to only be used from const contexts, as we don't want
    /// runtime panics if val is zero. The preferred way to get a LaError from a u32 is to
    /// use `LaError::try_from()` from the `TryFrom` trait impl.
    const fn new_const(val: u32) -> Self {
        match NonZeroU32::new(val) {
            Some(val) => Self(val),
            None => panic!("LaError cannot be 0"),
        }
    }

    /// Returns true if the code is part of the taxonomy handed back by the
    /// session API, as opposed to a fine-grained diagnostic code.
    pub fn is_public(&self) -> bool {
        self.0.get() & COMPONENT_MASK == PUBLIC_COMPONENT
    }

    define_error_constants![
        (INVALID_PARAMETER, 0x0000_0002, "Invalid parameter"),
        (INVALID_STATE, 0x0000_0005, "Operation invoked out of handshake order"),
        (OUT_OF_MEMORY, 0x0000_0003, "Out of memory"),
        (UNEXPECTED, 0x0000_0001, "Unexpected error"),
        (MAC_MISMATCH, 0x0000_3001, "MAC verification failed"),
        (
            KDF_MISMATCH,
            0x0000_3003,
            "Peer KDF identifier does not match the supported KDF"
        ),
        (
            CRYPTO_CMAC_FAILURE,
            0x0001_0002,
            "Crypto Error: AES-CMAC-128 failure"
        ),
        (
            CRYPTO_ECC_KEYGEN_FAILURE,
            0x0001_0003,
            "Crypto Error: ECC-256 key pair generation failure"
        ),
        (
            CRYPTO_ECDH_INVALID_POINT,
            0x0001_0004,
            "Crypto Error: peer public key is not a point on the curve"
        ),
        (
            CRYPTO_ECC_INVALID_PRIV_KEY,
            0x0001_0006,
            "Crypto Error: private scalar is not valid for the curve"
        ),
        (
            REPORT_CREATE_FAILURE,
            0x0002_0001,
            "Report Error: report creation failure"
        ),
        (
            REPORT_VERIFY_FAILURE,
            0x0002_0002,
            "Report Error: report MAC does not verify"
        ),
        (
            PROTO_SPEC_INVALID,
            0x0003_0001,
            "Protocol Error: protocol spec header is not valid"
        ),
        (
            TARGET_INFO_RANGE,
            0x0003_0002,
            "Protocol Error: protocol spec entry exceeds the target info or report"
        ),
        (
            TARGET_INFO_BAD_SOURCE,
            0x0003_0003,
            "Protocol Error: protocol spec entry has an unsupported source offset"
        ),
        (
            LAV2_SIGNATURE_MISMATCH,
            0x0003_0004,
            "Protocol Error: LAv2 protocol spec signature mismatch"
        ),
        (
            REPORT_DATA_MISMATCH,
            0x0003_0005,
            "Protocol Error: report data does not bind the session public keys"
        ),
        (
            KDF_LABEL_TOO_LONG,
            0x0004_0001,
            "KDF Error: label exceeds the derivation buffer"
        ),
        (
            MSG_INVALID_SIZE,
            0x0005_0001,
            "Message Error: encoded message has an invalid size"
        ),
        (
            MSG3_PROP_TOO_LARGE,
            0x0005_0002,
            "Message Error: message 3 additional property is too large"
        ),
    ];
}

impl fmt::Display for LaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name} (0x{:08x})", self.0.get()),
            None => write!(f, "0x{:08x}", self.0.get()),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for LaError {}

impl From<core::num::NonZeroU32> for crate::LaError {
    fn from(val: core::num::NonZeroU32) -> Self {
        crate::LaError(val)
    }
}

impl From<LaError> for core::num::NonZeroU32 {
    fn from(val: LaError) -> Self {
        val.0
    }
}

impl From<LaError> for u32 {
    fn from(val: LaError) -> Self {
        core::num::NonZeroU32::from(val).get()
    }
}

impl TryFrom<u32> for LaError {
    type Error = TryFromIntError;
    fn try_from(val: u32) -> Result<Self, TryFromIntError> {
        match NonZeroU32::try_from(val) {
            Ok(val) => Ok(LaError(val)),
            Err(err) => Err(err),
        }
    }
}

pub type LaResult<T> = Result<T, LaError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_try_from() {
        assert!(LaError::try_from(0).is_err());
        assert_eq!(
            Ok(LaError::KDF_MISMATCH),
            LaError::try_from(0x0000_3003)
        );
    }

    #[test]
    fn test_error_constants_uniqueness() {
        let constants = LaError::all_constants();
        let mut error_values = HashSet::new();
        let mut duplicates = Vec::new();

        for (name, value) in constants {
            if !error_values.insert(value) {
                duplicates.push((name, value));
            }
        }

        assert!(
            duplicates.is_empty(),
            "Found duplicate error codes: {:?}",
            duplicates
        );
    }

    #[test]
    fn test_public_taxonomy() {
        for err in [
            LaError::INVALID_PARAMETER,
            LaError::INVALID_STATE,
            LaError::OUT_OF_MEMORY,
            LaError::KDF_MISMATCH,
            LaError::MAC_MISMATCH,
            LaError::UNEXPECTED,
        ] {
            assert!(err.is_public(), "{err}");
        }
        assert!(!LaError::REPORT_VERIFY_FAILURE.is_public());
        assert!(!LaError::CRYPTO_ECDH_INVALID_POINT.is_public());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            LaError::MAC_MISMATCH.to_string(),
            "MAC_MISMATCH (0x00003001)"
        );
        let unknown = LaError::try_from(0x1234_5678).unwrap();
        assert_eq!(unknown.name(), None);
        assert_eq!(unknown.to_string(), "0x12345678");
    }
}

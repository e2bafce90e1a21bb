/*++

Licensed under the Apache-2.0 license.

File Name:

    msg.rs

Abstract:

    File contains the three local attestation handshake messages and their
    wire encoding.

--*/

use crate::crypto::{CmacTag, Ec256PublicKey, CMAC_SIZE};
use crate::report::{Report, TargetInfo};
use alloc::vec::Vec;
use core::mem::size_of;
use la_error::{LaError, LaResult};
use zerocopy::{FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout};

/// Message 1: responder to initiator
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct DhMsg1 {
    /// Responder ephemeral public key
    pub g_a: Ec256PublicKey,

    /// Target info addressing the responder
    pub target: TargetInfo,
}

/// Message 2: initiator to responder
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct DhMsg2 {
    /// Initiator ephemeral public key
    pub g_b: Ec256PublicKey,

    /// Initiator report addressed at the responder
    pub report: Report,

    /// MAC under the session MAC key
    pub cmac: CmacTag,
}

const _: () = assert!(size_of::<DhMsg1>() == 576);
const _: () = assert!(size_of::<DhMsg2>() == 512);

impl Default for DhMsg1 {
    fn default() -> Self {
        Self::new_zeroed()
    }
}

impl Default for DhMsg2 {
    fn default() -> Self {
        Self::new_zeroed()
    }
}

impl DhMsg1 {
    pub const SIZE: usize = size_of::<Self>();

    pub fn to_bytes(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }

    pub fn from_bytes(bytes: &[u8]) -> LaResult<Self> {
        Self::read_from_bytes(bytes).map_err(|_| LaError::MSG_INVALID_SIZE)
    }
}

impl DhMsg2 {
    pub const SIZE: usize = size_of::<Self>();

    pub fn to_bytes(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }

    pub fn from_bytes(bytes: &[u8]) -> LaResult<Self> {
        Self::read_from_bytes(bytes).map_err(|_| LaError::MSG_INVALID_SIZE)
    }
}

/// Body of message 3
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DhMsg3Body {
    /// Responder report addressed at the initiator
    pub report: Report,

    /// Opaque caller supplied property bytes
    pub additional_prop: Vec<u8>,
}

impl DhMsg3Body {
    /// Encoded size of the body without the additional property
    pub const FIXED_SIZE: usize = size_of::<Report>() + size_of::<u32>();

    /// Length of the additional property as carried on the wire
    pub fn additional_prop_length(&self) -> LaResult<u32> {
        check_prop_len(self.additional_prop.len())
    }
}

/// Message 3: responder to initiator
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DhMsg3 {
    /// MAC under the session MAC key
    pub cmac: CmacTag,

    /// Message body
    pub msg3_body: DhMsg3Body,
}

/// Largest additional property that keeps the encoded message 3 length
/// representable in 32 bits.
pub const MSG3_MAX_PROP_SIZE: usize = u32::MAX as usize - DhMsg3::FIXED_SIZE;

pub(crate) fn check_prop_len(len: usize) -> LaResult<u32> {
    if len > MSG3_MAX_PROP_SIZE {
        return Err(LaError::MSG3_PROP_TOO_LARGE);
    }
    u32::try_from(len).map_err(|_| LaError::MSG3_PROP_TOO_LARGE)
}

impl DhMsg3 {
    /// Encoded size of the message without the additional property
    pub const FIXED_SIZE: usize = CMAC_SIZE + DhMsg3Body::FIXED_SIZE;

    /// Create an empty message 3 carrying `additional_prop`
    pub fn with_prop(additional_prop: &[u8]) -> LaResult<Self> {
        check_prop_len(additional_prop.len())?;
        Ok(Self {
            cmac: [0u8; CMAC_SIZE],
            msg3_body: DhMsg3Body {
                report: Report::new_zeroed(),
                additional_prop: additional_prop.to_vec(),
            },
        })
    }

    /// Encoded size of the message
    pub fn size(&self) -> usize {
        Self::FIXED_SIZE + self.msg3_body.additional_prop.len()
    }

    pub fn to_bytes(&self) -> LaResult<Vec<u8>> {
        let prop_len = self.msg3_body.additional_prop_length()?;
        let mut bytes = Vec::with_capacity(self.size());
        bytes.extend_from_slice(&self.cmac);
        bytes.extend_from_slice(self.msg3_body.report.as_bytes());
        bytes.extend_from_slice(&prop_len.to_le_bytes());
        bytes.extend_from_slice(&self.msg3_body.additional_prop);
        Ok(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> LaResult<Self> {
        let (cmac, rest) = <CmacTag>::read_from_prefix(bytes).map_err(|_| LaError::MSG_INVALID_SIZE)?;
        let (report, rest) = Report::read_from_prefix(rest).map_err(|_| LaError::MSG_INVALID_SIZE)?;
        let (prop_len, prop) = <[u8; 4]>::read_from_prefix(rest).map_err(|_| LaError::MSG_INVALID_SIZE)?;
        let prop_len = u32::from_le_bytes(prop_len) as usize;
        check_prop_len(prop_len)?;
        if prop.len() != prop_len {
            return Err(LaError::MSG_INVALID_SIZE);
        }
        Ok(Self {
            cmac,
            msg3_body: DhMsg3Body {
                report,
                additional_prop: prop.to_vec(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_msg1_size_check() {
        let msg1 = DhMsg1::default();
        let bytes = msg1.to_bytes();
        assert_eq!(bytes.len(), DhMsg1::SIZE);
        assert_eq!(DhMsg1::from_bytes(&bytes), Ok(msg1));
        assert_eq!(
            DhMsg1::from_bytes(&bytes[1..]),
            Err(LaError::MSG_INVALID_SIZE)
        );
    }

    #[test]
    fn test_msg2_layout() {
        let mut msg2 = DhMsg2::default();
        msg2.g_b.gx[0] = 0xa5;
        msg2.cmac = [0x5a; CMAC_SIZE];
        let bytes = msg2.to_bytes();
        assert_eq!(bytes.len(), 512);
        assert_eq!(bytes[0], 0xa5);
        assert_eq!(&bytes[496..], &[0x5a; CMAC_SIZE]);
        let mut long = bytes.clone();
        long.push(0);
        assert_eq!(DhMsg2::from_bytes(&long), Err(LaError::MSG_INVALID_SIZE));
    }

    #[test]
    fn test_msg3_encoding() {
        let mut msg3 = DhMsg3::with_prop(b"prop").unwrap();
        msg3.cmac = [0x77; CMAC_SIZE];
        msg3.msg3_body.report.body.isv_svn = 4;

        let bytes = msg3.to_bytes().unwrap();
        assert_eq!(bytes.len(), DhMsg3::FIXED_SIZE + 4);
        assert_eq!(&bytes[..CMAC_SIZE], &[0x77; CMAC_SIZE]);
        assert_eq!(&bytes[448..452], &[4, 0, 0, 0]);
        assert_eq!(&bytes[452..], b"prop");
        assert_eq!(DhMsg3::from_bytes(&bytes), Ok(msg3));
    }

    #[test]
    fn test_msg3_length_mismatch() {
        let msg3 = DhMsg3::with_prop(b"prop").unwrap();
        let mut bytes = msg3.to_bytes().unwrap();
        bytes.pop();
        assert_eq!(DhMsg3::from_bytes(&bytes), Err(LaError::MSG_INVALID_SIZE));
        assert_eq!(
            DhMsg3::from_bytes(&bytes[..DhMsg3::FIXED_SIZE - 1]),
            Err(LaError::MSG_INVALID_SIZE)
        );
    }

    #[test]
    fn test_msg3_prop_bound() {
        assert_eq!(check_prop_len(MSG3_MAX_PROP_SIZE + 1), Err(LaError::MSG3_PROP_TOO_LARGE));
        assert_eq!(check_prop_len(16), Ok(16));
    }
}

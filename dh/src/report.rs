/*++

Licensed under the Apache-2.0 license.

File Name:

    report.rs

Abstract:

    File contains the hardware report, target info and enclave identity
    structures exchanged during local attestation.

--*/

use bitflags::bitflags;
use core::mem::{offset_of, size_of};
use zerocopy::{FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout};
use zeroize::Zeroize;

/// Size of a measurement (MRENCLAVE / MRSIGNER)
pub const MEASUREMENT_SIZE: usize = 32;

/// Size of the user data carried in a report
pub const REPORT_DATA_SIZE: usize = 64;

/// Size of the CPU security version
pub const CPU_SVN_SIZE: usize = 16;

/// Size of the config id
pub const CONFIG_ID_SIZE: usize = 64;

/// Size of the key id embedded in a report
pub const KEY_ID_SIZE: usize = 32;

/// Size of the report MAC
pub const REPORT_MAC_SIZE: usize = 16;

bitflags! {
    /// Enclave attribute flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AttributeFlags: u64 {
        const INITTED = 0x0000_0000_0000_0001;
        const DEBUG = 0x0000_0000_0000_0002;
        const MODE64BIT = 0x0000_0000_0000_0004;
        const PROVISIONKEY = 0x0000_0000_0000_0010;
        const EINITTOKEN_KEY = 0x0000_0000_0000_0020;
        const KSS = 0x0000_0000_0000_0080;
        const AEXNOTIFY = 0x0000_0000_0000_0400;
    }
}

/// Enclave attributes
#[repr(C)]
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable, Zeroize,
)]
pub struct Attributes {
    /// Raw attribute flags
    pub flags: u64,

    /// Extended features request mask
    pub xfrm: u64,
}

impl Attributes {
    /// Flags view of the attributes. Unknown bits are retained.
    pub fn flags(&self) -> AttributeFlags {
        AttributeFlags::from_bits_retain(self.flags)
    }
}

/// User data bound into a report
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable, Zeroize)]
pub struct ReportData(pub [u8; REPORT_DATA_SIZE]);

impl Default for ReportData {
    fn default() -> Self {
        Self([0u8; REPORT_DATA_SIZE])
    }
}

impl ReportData {
    /// Report data whose leading bytes are `prefix` and the rest zero.
    pub fn with_prefix(prefix: &[u8]) -> Self {
        let mut data = Self::default();
        let len = prefix.len().min(REPORT_DATA_SIZE);
        data.0[..len].copy_from_slice(&prefix[..len]);
        data
    }
}

/// Report body
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable, Zeroize)]
pub struct ReportBody {
    /// Security version of the CPU
    pub cpu_svn: [u8; CPU_SVN_SIZE],

    /// Which fields are defined in SSA.MISC
    pub misc_select: u32,

    /// CET attributes
    pub cet_attributes: u8,

    pub reserved1: [u8; 11],

    /// Extended product id
    pub isv_ext_prod_id: [u8; 16],

    /// Enclave attributes
    pub attributes: Attributes,

    /// Measurement of the enclave code
    pub mr_enclave: [u8; MEASUREMENT_SIZE],

    pub reserved2: [u8; 32],

    /// Measurement of the enclave signer
    pub mr_signer: [u8; MEASUREMENT_SIZE],

    pub reserved3: [u8; 32],

    /// Config id
    pub config_id: [u8; CONFIG_ID_SIZE],

    /// Product id
    pub isv_prod_id: u16,

    /// Security version
    pub isv_svn: u16,

    /// Config security version
    pub config_svn: u16,

    pub reserved4: [u8; 42],

    /// Family id
    pub isv_family_id: [u8; 16],

    /// User data
    pub report_data: ReportData,
}

impl Default for ReportBody {
    fn default() -> Self {
        Self::new_zeroed()
    }
}

/// Hardware report
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable, Zeroize)]
pub struct Report {
    /// Report body
    pub body: ReportBody,

    /// Key wear-out protection value
    pub key_id: [u8; KEY_ID_SIZE],

    /// MAC over the report body
    pub mac: [u8; REPORT_MAC_SIZE],
}

impl Default for Report {
    fn default() -> Self {
        Self::new_zeroed()
    }
}

/// Addressing information for a report request
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable, Zeroize)]
pub struct TargetInfo {
    /// Measurement of the target enclave
    pub mr_enclave: [u8; MEASUREMENT_SIZE],

    /// Attributes of the target enclave
    pub attributes: Attributes,

    /// CET attributes of the target enclave
    pub cet_attributes: u8,

    pub reserved1: u8,

    /// Config security version of the target enclave
    pub config_svn: u16,

    /// Misc select of the target enclave
    pub misc_select: u32,

    pub reserved2: [u8; 8],

    /// Config id of the target enclave
    pub config_id: [u8; CONFIG_ID_SIZE],

    pub reserved3: [u8; 384],
}

impl Default for TargetInfo {
    fn default() -> Self {
        Self::new_zeroed()
    }
}

impl TargetInfo {
    /// Number of leading bytes that identify the target. The remainder is
    /// reserved and always zero.
    pub const IDENTITY_SIZE: usize = offset_of!(TargetInfo, reserved3);

    /// The bytes that identify the target
    pub fn identity_bytes(&self) -> &[u8] {
        &self.as_bytes()[..Self::IDENTITY_SIZE]
    }
}

/// Identity of the peer enclave as established by a verified report
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Zeroize)]
pub struct EnclaveIdentity {
    /// Security version of the CPU
    pub cpu_svn: [u8; CPU_SVN_SIZE],

    /// Misc select
    pub misc_select: u32,

    /// Attributes
    pub attributes: Attributes,

    /// Measurement of the enclave code
    pub mr_enclave: [u8; MEASUREMENT_SIZE],

    /// Measurement of the enclave signer
    pub mr_signer: [u8; MEASUREMENT_SIZE],

    /// Product id
    pub isv_prod_id: u16,

    /// Security version
    pub isv_svn: u16,
}

impl From<&ReportBody> for EnclaveIdentity {
    /// Copy the identity fields out of a report body.
    fn from(body: &ReportBody) -> Self {
        Self {
            cpu_svn: body.cpu_svn,
            misc_select: body.misc_select,
            attributes: body.attributes,
            mr_enclave: body.mr_enclave,
            mr_signer: body.mr_signer,
            isv_prod_id: body.isv_prod_id,
            isv_svn: body.isv_svn,
        }
    }
}

const _: () = assert!(size_of::<Attributes>() == 16);
const _: () = assert!(size_of::<ReportData>() == REPORT_DATA_SIZE);
const _: () = assert!(size_of::<ReportBody>() == 384);
const _: () = assert!(offset_of!(ReportBody, attributes) == 48);
const _: () = assert!(offset_of!(ReportBody, mr_enclave) == 64);
const _: () = assert!(offset_of!(ReportBody, config_id) == 192);
const _: () = assert!(offset_of!(ReportBody, config_svn) == 260);
const _: () = assert!(offset_of!(ReportBody, report_data) == 320);
const _: () = assert!(size_of::<Report>() == 432);
const _: () = assert!(size_of::<TargetInfo>() == 512);
const _: () = assert!(offset_of!(TargetInfo, config_svn) == 50);
const _: () = assert!(offset_of!(TargetInfo, misc_select) == 52);
const _: () = assert!(offset_of!(TargetInfo, config_id) == 64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_from_body() {
        let mut body = ReportBody::default();
        body.mr_enclave = [0x11; MEASUREMENT_SIZE];
        body.mr_signer = [0x22; MEASUREMENT_SIZE];
        body.isv_prod_id = 7;
        body.isv_svn = 3;
        body.attributes.flags = (AttributeFlags::INITTED | AttributeFlags::MODE64BIT).bits();
        body.report_data = ReportData([0xff; REPORT_DATA_SIZE]);

        let id = EnclaveIdentity::from(&body);
        assert_eq!(id.mr_enclave, [0x11; MEASUREMENT_SIZE]);
        assert_eq!(id.mr_signer, [0x22; MEASUREMENT_SIZE]);
        assert_eq!(id.isv_prod_id, 7);
        assert_eq!(id.isv_svn, 3);
        assert!(id.attributes.flags().contains(AttributeFlags::MODE64BIT));
        assert!(!id.attributes.flags().contains(AttributeFlags::DEBUG));
    }

    #[test]
    fn test_report_data_with_prefix() {
        let data = ReportData::with_prefix(&[1, 2, 3]);
        assert_eq!(&data.0[..3], &[1, 2, 3]);
        assert!(data.0[3..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_report_wire_layout() {
        let mut report = Report::default();
        report.body.isv_svn = 0x0102;
        report.mac = [0xaa; REPORT_MAC_SIZE];
        let bytes = report.as_bytes();
        assert_eq!(bytes.len(), 432);
        assert_eq!(&bytes[258..260], &[0x02, 0x01]);
        assert_eq!(&bytes[416..], &[0xaa; REPORT_MAC_SIZE]);
    }
}

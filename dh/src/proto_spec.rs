/*++

Licensed under the Apache-2.0 license.

File Name:

    proto_spec.rs

Abstract:

    File contains the self-describing LAv2 protocol spec and the derivation
    of a target info from a report according to such a spec.

--*/

use crate::crypto::ReportProvider;
use crate::report::{Report, ReportData, TargetInfo};
use core::mem::{offset_of, size_of};
use la_error::{LaError, LaResult};
use zerocopy::{FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout};

/// Number of 16-bit words in the target spec array. Word 0 is the header.
pub const TARGET_SPEC_WORDS: usize = 28;

/// Source offset meaning "leave the destination zero"
const SRC_OFFSET_ZERO: i16 = -1;

/// LAv2 protocol spec.
///
/// Transmitted verbatim as the report data of LAv2 message 2. The target
/// spec lists which report bytes make up the target info that addresses a
/// report at the sender.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct ProtoSpec {
    /// ASCII protocol signature
    pub signature: [u8; 6],

    /// Protocol version
    pub ver: u8,

    /// Protocol revision
    pub rev: u8,

    /// Header word followed by (offset, log2 size) entries.
    ///
    /// Header: low byte is the target spec revision, high byte the entry
    /// count. Entry: low nibble is log2 of the size, the upper 12 bits are
    /// the signed source offset into the report.
    pub target_spec: [u16; TARGET_SPEC_WORDS],
}

const _: () = assert!(size_of::<ProtoSpec>() == size_of::<ReportData>());

/// Protocol spec used by LAv2 and by every target info derivation.
pub const LAV2_PROTO_SPEC: ProtoSpec = ProtoSpec {
    signature: *b"SGX LA",
    ver: 2,
    rev: 0,
    target_spec: [
        0x0600, // target spec count & revision
        0x0405, // MRENCLAVE
        0x0304, // ATTRIBUTES
        0x0140, // CET_ATTRIBUTES
        0x1041, // CONFIGSVN
        0x0102, // MISCSELECT
        0x0C06, // CONFIGID
        0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    ],
};

/// Number of leading bytes a peer's spec must share with ours: everything up
/// to, but excluding, the revision.
pub const PROTO_SPEC_ID_SIZE: usize = offset_of!(ProtoSpec, rev);

impl ProtoSpec {
    /// View the spec as report data.
    pub fn to_report_data(&self) -> ReportData {
        let mut data = ReportData::new_zeroed();
        data.0.copy_from_slice(self.as_bytes());
        data
    }

    /// Interpret report data as a spec.
    pub fn from_report_data(data: &ReportData) -> Self {
        // PANIC-FREE: both types are exactly 64 bytes.
        Self::read_from_bytes(&data.0).unwrap_or(Self::new_zeroed())
    }

    /// Number of entries declared by the header
    pub fn ts_count(&self) -> usize {
        (self.target_spec[0] >> 8) as usize
    }

    /// Checks the header of the spec
    pub fn is_valid(&self) -> bool {
        self.signature == LAV2_PROTO_SPEC.signature
            && self.ver == LAV2_PROTO_SPEC.ver
            && self.rev == LAV2_PROTO_SPEC.rev
            && (self.target_spec[0] & 0xff) == 0
            && self.ts_count() < TARGET_SPEC_WORDS
    }

    /// True if `data` starts with the identifying prefix of this spec
    pub fn matches_prefix(&self, data: &ReportData) -> bool {
        crate::crypto::ct_eq(
            &data.0[..PROTO_SPEC_ID_SIZE],
            &self.as_bytes()[..PROTO_SPEC_ID_SIZE],
        )
    }

    /// Build the target info addressing the author of `report`.
    ///
    /// # Arguments
    ///
    /// * `report` - Report whose identity fields are copied
    ///
    /// # Returns
    ///
    /// * `TargetInfo` - Target info with every listed field copied at its
    ///   naturally aligned position
    pub fn make_target_info(&self, report: &Report) -> LaResult<TargetInfo> {
        if !self.is_valid() {
            return Err(LaError::PROTO_SPEC_INVALID);
        }

        let mut ti = TargetInfo::new_zeroed();
        let src = report.as_bytes();
        let dst = ti.as_mut_bytes();

        let mut to = 0usize;
        for entry in &self.target_spec[1..=self.ts_count()] {
            let size = 1usize << (entry & 0xf);
            to = (to + size - 1) & !(size - 1);
            if to + size > dst.len() {
                return Err(LaError::TARGET_INFO_RANGE);
            }

            let from = (*entry as i16) >> 4;
            if from >= 0 {
                let from = from as usize;
                let bytes = src
                    .get(from..from + size)
                    .ok_or(LaError::TARGET_INFO_RANGE)?;
                dst[to..to + size].copy_from_slice(bytes);
            } else if from != SRC_OFFSET_ZERO {
                return Err(LaError::TARGET_INFO_BAD_SOURCE);
            }

            to += size;
        }

        Ok(ti)
    }
}

/// Derive the target info addressing the author of `report`, using the
/// built-in protocol spec.
pub fn derive_target_from_report(report: &Report) -> LaResult<TargetInfo> {
    LAV2_PROTO_SPEC.make_target_info(report)
}

/// Derive the target info addressing the calling code.
pub fn self_target<R: ReportProvider>(reports: &mut R) -> LaResult<TargetInfo> {
    let report = reports.create_report(None, &ReportData::default())?;
    derive_target_from_report(&report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{AttributeFlags, MEASUREMENT_SIZE};

    fn sample_report() -> Report {
        let mut report = Report::default();
        report.body.mr_enclave = [0x11; MEASUREMENT_SIZE];
        report.body.mr_signer = [0x22; MEASUREMENT_SIZE];
        report.body.attributes.flags = (AttributeFlags::INITTED | AttributeFlags::DEBUG).bits();
        report.body.attributes.xfrm = 0x3;
        report.body.cet_attributes = 0x5;
        report.body.config_svn = 0x0a0b;
        report.body.misc_select = 0x1234_5678;
        report.body.config_id = [0x33; 64];
        report.body.isv_svn = 9;
        report.body.report_data = ReportData([0x44; 64]);
        report
    }

    #[test]
    fn test_builtin_spec_is_valid() {
        assert!(LAV2_PROTO_SPEC.is_valid());
        assert_eq!(LAV2_PROTO_SPEC.ts_count(), 6);
        assert_eq!(PROTO_SPEC_ID_SIZE, 7);
        assert_eq!(&LAV2_PROTO_SPEC.as_bytes()[..8], b"SGX LA\x02\x00");
    }

    #[test]
    fn test_make_target_info() {
        let report = sample_report();
        let ti = derive_target_from_report(&report).unwrap();

        assert_eq!(ti.mr_enclave, report.body.mr_enclave);
        assert_eq!(ti.attributes, report.body.attributes);
        assert_eq!(ti.cet_attributes, 0x5);
        assert_eq!(ti.reserved1, 0);
        assert_eq!(ti.config_svn, 0x0a0b);
        assert_eq!(ti.misc_select, 0x1234_5678);
        assert_eq!(ti.config_id, [0x33; 64]);
        assert!(ti.reserved2.iter().all(|&b| b == 0));
        assert!(ti.reserved3.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_report_data_round_trip() {
        let data = LAV2_PROTO_SPEC.to_report_data();
        assert_eq!(ProtoSpec::from_report_data(&data), LAV2_PROTO_SPEC);
        assert!(LAV2_PROTO_SPEC.matches_prefix(&data));

        let mut other = data;
        other.0[7] = 1;
        assert!(LAV2_PROTO_SPEC.matches_prefix(&other));
        other.0[6] = 3;
        assert!(!LAV2_PROTO_SPEC.matches_prefix(&other));
    }

    #[test]
    fn test_invalid_header() {
        let report = sample_report();

        let mut spec = LAV2_PROTO_SPEC;
        spec.ver = 1;
        assert_eq!(
            spec.make_target_info(&report),
            Err(LaError::PROTO_SPEC_INVALID)
        );

        let mut spec = LAV2_PROTO_SPEC;
        spec.signature = *b"SGX LB";
        assert!(!spec.is_valid());

        let mut spec = LAV2_PROTO_SPEC;
        spec.target_spec[0] = 0x0601;
        assert!(!spec.is_valid());

        let mut spec = LAV2_PROTO_SPEC;
        spec.target_spec[0] = (TARGET_SPEC_WORDS as u16) << 8;
        assert!(!spec.is_valid());
    }

    #[test]
    fn test_leave_zero_entry() {
        let mut spec = LAV2_PROTO_SPEC;
        // Replace MRENCLAVE with a 32 byte "leave zero" entry.
        spec.target_spec[1] = 0xfff5;
        let ti = spec.make_target_info(&sample_report()).unwrap();
        assert_eq!(ti.mr_enclave, [0; MEASUREMENT_SIZE]);
        assert_eq!(ti.config_id, [0x33; 64]);
    }

    #[test]
    fn test_bad_source_offset() {
        let mut spec = LAV2_PROTO_SPEC;
        spec.target_spec[1] = 0xffe5;
        assert_eq!(
            spec.make_target_info(&sample_report()),
            Err(LaError::TARGET_INFO_BAD_SOURCE)
        );
    }

    #[test]
    fn test_destination_overflow() {
        let mut spec = LAV2_PROTO_SPEC;
        // Nine 64-byte entries need 576 bytes; the target info has 512.
        spec.target_spec[0] = 0x0900;
        for entry in &mut spec.target_spec[1..=9] {
            *entry = 0x0C06;
        }
        assert_eq!(
            spec.make_target_info(&sample_report()),
            Err(LaError::TARGET_INFO_RANGE)
        );
    }

    #[test]
    fn test_source_overflow() {
        let mut spec = LAV2_PROTO_SPEC;
        // 64 bytes starting at offset 0x190 run past the 432 byte report.
        spec.target_spec[6] = 0x1906;
        assert_eq!(
            spec.make_target_info(&sample_report()),
            Err(LaError::TARGET_INFO_RANGE)
        );
    }
}

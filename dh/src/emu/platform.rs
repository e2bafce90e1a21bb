/*++

Licensed under the Apache-2.0 license.

File Name:

    platform.rs

Abstract:

    File contains an emulated report platform. Enclaves on the same platform
    share a report secret, so a report MAC'd for one enclave can be checked by
    that enclave and by no other.

--*/

use super::SoftCrypto;
use crate::crypto::{
    ct_eq, CmacTag, Ec256PrivateKey, Ec256PublicKey, Ec256SharedSecret, Key128, LaCrypto,
    ReportProvider, Sha256Digest, CMAC_SIZE,
};
use crate::report::{
    AttributeFlags, Attributes, Report, ReportBody, ReportData, TargetInfo, CONFIG_ID_SIZE,
    CPU_SVN_SIZE, KEY_ID_SIZE, MEASUREMENT_SIZE,
};
use la_error::{LaError, LaResult};
use rand::rngs::OsRng;
use rand::RngCore;
use std::sync::Arc;
use zerocopy::IntoBytes;

/// Domain separator of the report key derivation
const REPORT_KEY_LABEL: &[u8] = b"REPORT";

/// Emulated platform holding the report secret
pub struct EmuPlatform {
    report_secret: Key128,
}

impl core::fmt::Debug for EmuPlatform {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EmuPlatform").finish_non_exhaustive()
    }
}

impl EmuPlatform {
    /// Create a platform with a fresh random report secret
    pub fn new() -> Arc<Self> {
        let mut report_secret = Key128::default();
        OsRng.fill_bytes(&mut report_secret.0);
        Arc::new(Self { report_secret })
    }

    /// Key MAC'ing reports addressed at `target`
    fn report_key(
        &self,
        crypto: &mut SoftCrypto,
        key_id: &[u8; KEY_ID_SIZE],
        target: &TargetInfo,
    ) -> LaResult<Key128> {
        let key = crypto.cmac128(
            &self.report_secret,
            &[REPORT_KEY_LABEL, key_id, target.identity_bytes()],
        )?;
        Ok(Key128(key))
    }
}

/// Identity of an emulated enclave
#[derive(Clone, Debug)]
pub struct EmuEnclaveParams {
    pub cpu_svn: [u8; CPU_SVN_SIZE],
    pub misc_select: u32,
    pub cet_attributes: u8,
    pub attributes: Attributes,
    pub mr_enclave: [u8; MEASUREMENT_SIZE],
    pub mr_signer: [u8; MEASUREMENT_SIZE],
    pub config_id: [u8; CONFIG_ID_SIZE],
    pub isv_prod_id: u16,
    pub isv_svn: u16,
    pub config_svn: u16,
}

impl Default for EmuEnclaveParams {
    fn default() -> Self {
        Self {
            cpu_svn: [0u8; CPU_SVN_SIZE],
            misc_select: 0,
            cet_attributes: 0,
            attributes: Attributes {
                flags: (AttributeFlags::INITTED | AttributeFlags::MODE64BIT).bits(),
                xfrm: 0x3,
            },
            mr_enclave: [0u8; MEASUREMENT_SIZE],
            mr_signer: [0u8; MEASUREMENT_SIZE],
            config_id: [0u8; CONFIG_ID_SIZE],
            isv_prod_id: 0,
            isv_svn: 0,
            config_svn: 0,
        }
    }
}

/// Emulated enclave. Provides both the primitives and the report services.
pub struct EmuEnclave {
    platform: Arc<EmuPlatform>,
    params: EmuEnclaveParams,
    crypto: SoftCrypto,
}

impl EmuEnclave {
    pub fn new(platform: Arc<EmuPlatform>, params: EmuEnclaveParams) -> Self {
        Self {
            platform,
            params,
            crypto: SoftCrypto::new(),
        }
    }

    pub fn params(&self) -> &EmuEnclaveParams {
        &self.params
    }

    /// Target info addressing this enclave
    pub fn target_info(&self) -> TargetInfo {
        TargetInfo {
            mr_enclave: self.params.mr_enclave,
            attributes: self.params.attributes,
            cet_attributes: self.params.cet_attributes,
            config_svn: self.params.config_svn,
            misc_select: self.params.misc_select,
            config_id: self.params.config_id,
            ..Default::default()
        }
    }

    fn report_body(&self, data: &ReportData) -> ReportBody {
        ReportBody {
            cpu_svn: self.params.cpu_svn,
            misc_select: self.params.misc_select,
            cet_attributes: self.params.cet_attributes,
            attributes: self.params.attributes,
            mr_enclave: self.params.mr_enclave,
            mr_signer: self.params.mr_signer,
            config_id: self.params.config_id,
            isv_prod_id: self.params.isv_prod_id,
            isv_svn: self.params.isv_svn,
            config_svn: self.params.config_svn,
            report_data: *data,
            ..Default::default()
        }
    }

    fn report_mac(
        &mut self,
        body: &ReportBody,
        key_id: &[u8; KEY_ID_SIZE],
        target: &TargetInfo,
    ) -> LaResult<CmacTag> {
        let key = self.platform.report_key(&mut self.crypto, key_id, target)?;
        self.crypto.cmac128(&key, &[body.as_bytes()])
    }
}

impl ReportProvider for EmuEnclave {
    fn create_report(
        &mut self,
        target: Option<&TargetInfo>,
        data: &ReportData,
    ) -> LaResult<Report> {
        let target = match target {
            Some(target) => *target,
            None => self.target_info(),
        };

        let mut report = Report {
            body: self.report_body(data),
            key_id: [0u8; KEY_ID_SIZE],
            mac: [0u8; CMAC_SIZE],
        };
        OsRng.fill_bytes(&mut report.key_id);
        report.mac = self
            .report_mac(&report.body, &report.key_id, &target)
            .map_err(|_| LaError::REPORT_CREATE_FAILURE)?;
        Ok(report)
    }

    fn verify_report(&mut self, report: &Report) -> LaResult<()> {
        let own = self.target_info();
        let mac = self.report_mac(&report.body, &report.key_id, &own)?;
        if !ct_eq(&mac, &report.mac) {
            return Err(LaError::REPORT_VERIFY_FAILURE);
        }
        Ok(())
    }
}

impl LaCrypto for EmuEnclave {
    fn sha256(&mut self, parts: &[&[u8]]) -> LaResult<Sha256Digest> {
        self.crypto.sha256(parts)
    }

    fn cmac128(&mut self, key: &Key128, parts: &[&[u8]]) -> LaResult<CmacTag> {
        self.crypto.cmac128(key, parts)
    }

    fn ecc256_key_pair(&mut self) -> LaResult<(Ec256PrivateKey, Ec256PublicKey)> {
        self.crypto.ecc256_key_pair()
    }

    fn ecc256_shared_dhkey(
        &mut self,
        priv_key: &Ec256PrivateKey,
        peer: &Ec256PublicKey,
    ) -> LaResult<Ec256SharedSecret> {
        self.crypto.ecc256_shared_dhkey(priv_key, peer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto_spec::{derive_target_from_report, self_target};

    fn enclave(platform: &Arc<EmuPlatform>, mr_enclave: u8) -> EmuEnclave {
        EmuEnclave::new(
            platform.clone(),
            EmuEnclaveParams {
                mr_enclave: [mr_enclave; MEASUREMENT_SIZE],
                isv_svn: 2,
                config_svn: 0x0102,
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_self_report_verifies() {
        let platform = EmuPlatform::new();
        let mut a = enclave(&platform, 0xaa);
        let data = ReportData([0x5a; 64]);
        let report = a.create_report(None, &data).unwrap();
        assert_eq!(report.body.report_data, data);
        assert_eq!(report.body.isv_svn, 2);
        assert_eq!(a.verify_report(&report), Ok(()));
    }

    #[test]
    fn test_self_target_matches_target_info() {
        let platform = EmuPlatform::new();
        let mut a = enclave(&platform, 0xaa);
        assert_eq!(self_target(&mut a).unwrap(), a.target_info());
    }

    #[test]
    fn test_report_only_verifies_at_target() {
        let platform = EmuPlatform::new();
        let mut a = enclave(&platform, 0xaa);
        let mut b = enclave(&platform, 0xbb);

        let b_self = b.create_report(None, &ReportData::default()).unwrap();
        let b_target = derive_target_from_report(&b_self).unwrap();
        let report = a
            .create_report(Some(&b_target), &ReportData::default())
            .unwrap();
        assert_eq!(b.verify_report(&report), Ok(()));
        assert_eq!(a.verify_report(&report), Err(LaError::REPORT_VERIFY_FAILURE));
    }

    #[test]
    fn test_report_bound_to_platform() {
        let mut a = enclave(&EmuPlatform::new(), 0xaa);
        let mut other = enclave(&EmuPlatform::new(), 0xaa);
        let report = a.create_report(None, &ReportData::default()).unwrap();
        assert_eq!(other.verify_report(&report), Err(LaError::REPORT_VERIFY_FAILURE));
    }

    #[test]
    fn test_tampered_report_rejected() {
        let platform = EmuPlatform::new();
        let mut a = enclave(&platform, 0xaa);
        let mut report = a.create_report(None, &ReportData::default()).unwrap();
        report.body.report_data.0[0] ^= 1;
        assert_eq!(a.verify_report(&report), Err(LaError::REPORT_VERIFY_FAILURE));
    }
}

/*++

Licensed under the Apache-2.0 license.

File Name:

    lav1.rs

Abstract:

    File contains the LAv1 message 2 / message 3 generator and verifier.

    LAv1 binds the exchanged public keys and the KDF-ID into the report
    data and MACs the complete report.

--*/

use super::{kdf_bound_report_data, report_data_kdf_id, verify_cmac128, LaProtocol, LaVersion};
use crate::crypto::{ct_eq, DhEnv, Ec256PublicKey, Key128};
use crate::kdf::AES_CMAC_KDF_ID;
use crate::msg::{DhMsg1, DhMsg2, DhMsg3};
use crate::proto_spec::LAV2_PROTO_SPEC;
use la_error::{LaError, LaResult};
use zerocopy::IntoBytes;

/// LAv1 local attestation
pub enum LaV1 {}

impl LaProtocol for LaV1 {
    const VERSION: LaVersion = LaVersion::V1;

    fn generate_msg2<E: DhEnv>(
        env: &mut E,
        msg1: &DhMsg1,
        g_b: &Ec256PublicKey,
        smk: &Key128,
    ) -> LaResult<DhMsg2> {
        let msg_hash = env.sha256(&[msg1.g_a.as_bytes(), g_b.as_bytes()])?;
        let report_data = kdf_bound_report_data(&msg_hash);
        let report = env.create_report(Some(&msg1.target), &report_data)?;
        let cmac = env.cmac128(smk, &[report.as_bytes()])?;

        Ok(DhMsg2 {
            g_b: *g_b,
            report,
            cmac,
        })
    }

    fn verify_msg2<E: DhEnv>(
        env: &mut E,
        msg2: &DhMsg2,
        g_a: &Ec256PublicKey,
        smk: &Key128,
    ) -> LaResult<()> {
        let report_data = &msg2.report.body.report_data;
        if report_data_kdf_id(report_data) != AES_CMAC_KDF_ID {
            return Err(LaError::KDF_MISMATCH);
        }

        verify_cmac128(env, smk, &[msg2.report.as_bytes()], &msg2.cmac)?;
        env.verify_report(&msg2.report)?;

        let msg_hash = env.sha256(&[g_a.as_bytes(), msg2.g_b.as_bytes()])?;
        if !ct_eq(&msg_hash, &report_data.0[..msg_hash.len()]) {
            return Err(LaError::REPORT_DATA_MISMATCH);
        }
        Ok(())
    }

    fn generate_msg3<E: DhEnv>(
        env: &mut E,
        msg2: &DhMsg2,
        g_a: &Ec256PublicKey,
        smk: &Key128,
        additional_prop: &[u8],
    ) -> LaResult<DhMsg3> {
        let mut msg3 = DhMsg3::with_prop(additional_prop)?;

        let msg_hash = env.sha256(&[msg2.g_b.as_bytes(), g_a.as_bytes()])?;
        let report_data = kdf_bound_report_data(&msg_hash);
        let target = LAV2_PROTO_SPEC.make_target_info(&msg2.report)?;
        msg3.msg3_body.report = env.create_report(Some(&target), &report_data)?;

        let prop_len = msg3.msg3_body.additional_prop_length()?.to_le_bytes();
        msg3.cmac = env.cmac128(
            smk,
            &[
                msg3.msg3_body.report.as_bytes(),
                &prop_len,
                &msg3.msg3_body.additional_prop,
            ],
        )?;

        Ok(msg3)
    }

    fn verify_msg3<E: DhEnv>(
        env: &mut E,
        msg3: &DhMsg3,
        g_a: &Ec256PublicKey,
        g_b: &Ec256PublicKey,
        smk: &Key128,
    ) -> LaResult<()> {
        let body = &msg3.msg3_body;
        let prop_len = body.additional_prop_length()?.to_le_bytes();
        verify_cmac128(
            env,
            smk,
            &[body.report.as_bytes(), &prop_len, &body.additional_prop],
            &msg3.cmac,
        )?;

        env.verify_report(&body.report)?;

        let msg_hash = env.sha256(&[g_b.as_bytes(), g_a.as_bytes()])?;
        if !ct_eq(&msg_hash, &body.report.body.report_data.0[..msg_hash.len()]) {
            return Err(LaError::REPORT_DATA_MISMATCH);
        }
        Ok(())
    }
}

/*++

Licensed under the Apache-2.0 license.

File Name:

    lav2.rs

Abstract:

    File contains the LAv2 message 2 / message 3 generator and verifier.

    LAv2 carries the protocol spec in the clear as the report data of
    message 2. The hardware report binds SHA-256(spec || public key), which
    the receiver recomputes before verifying the report.

--*/

use super::{verify_cmac128, LaProtocol, LaVersion};
use crate::crypto::{ct_eq, DhEnv, Ec256PublicKey, Key128};
use crate::msg::{DhMsg1, DhMsg2, DhMsg3};
use crate::proto_spec::{ProtoSpec, LAV2_PROTO_SPEC};
use crate::report::ReportData;
use la_error::{LaError, LaResult};
use zerocopy::IntoBytes;

/// LAv2 local attestation
pub enum LaV2 {}

impl LaProtocol for LaV2 {
    const VERSION: LaVersion = LaVersion::V2;

    fn generate_msg2<E: DhEnv>(
        env: &mut E,
        msg1: &DhMsg1,
        g_b: &Ec256PublicKey,
        smk: &Key128,
    ) -> LaResult<DhMsg2> {
        let digest = env.sha256(&[LAV2_PROTO_SPEC.as_bytes(), g_b.as_bytes()])?;
        let mut report = env.create_report(Some(&msg1.target), &ReportData::with_prefix(&digest))?;

        // The receiver rebuilds the bound digest from the spec it finds here.
        report.body.report_data = LAV2_PROTO_SPEC.to_report_data();

        let cmac = env.cmac128(smk, &[g_b.as_bytes()])?;

        Ok(DhMsg2 {
            g_b: *g_b,
            report,
            cmac,
        })
    }

    fn verify_msg2<E: DhEnv>(
        env: &mut E,
        msg2: &DhMsg2,
        _g_a: &Ec256PublicKey,
        smk: &Key128,
    ) -> LaResult<()> {
        let mut report = msg2.report;
        let digest = env.sha256(&[msg2.report.body.report_data.as_bytes(), msg2.g_b.as_bytes()])?;
        report.body.report_data = ReportData::with_prefix(&digest);
        env.verify_report(&report)?;

        verify_cmac128(env, smk, &[msg2.g_b.as_bytes()], &msg2.cmac)?;

        if !LAV2_PROTO_SPEC.matches_prefix(&msg2.report.body.report_data) {
            return Err(LaError::LAV2_SIGNATURE_MISMATCH);
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

        // Address the initiator the way its own spec asks for.
        let spec = ProtoSpec::from_report_data(&msg2.report.body.report_data);
        let target = spec.make_target_info(&msg2.report)?;

        let digest = env.sha256(&[g_a.as_bytes(), spec.as_bytes()])?;
        msg3.msg3_body.report =
            env.create_report(Some(&target), &ReportData::with_prefix(&digest))?;

        msg3.cmac = env.cmac128(smk, &[&msg3.msg3_body.additional_prop, g_a.as_bytes()])?;

        Ok(msg3)
    }

    fn verify_msg3<E: DhEnv>(
        env: &mut E,
        msg3: &DhMsg3,
        g_a: &Ec256PublicKey,
        _g_b: &Ec256PublicKey,
        smk: &Key128,
    ) -> LaResult<()> {
        let body = &msg3.msg3_body;

        let digest = env.sha256(&[g_a.as_bytes(), LAV2_PROTO_SPEC.as_bytes()])?;
        let expected = ReportData::with_prefix(&digest);
        if !ct_eq(expected.as_bytes(), body.report.body.report_data.as_bytes()) {
            return Err(LaError::REPORT_DATA_MISMATCH);
        }

        env.verify_report(&body.report)?;

        verify_cmac128(
            env,
            smk,
            &[&body.additional_prop, g_a.as_bytes()],
            &msg3.cmac,
        )
    }
}

/*++

Licensed under the Apache-2.0 license.

File Name:

    lib.rs

Abstract:

    File contains exports for the Diffie-Hellman local attestation library.

--*/

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod crypto;
pub mod kdf;
mod msg;
mod proto_spec;
mod protocol;
mod report;
mod session;

#[cfg(feature = "emu")]
pub mod emu;

pub use crypto::{
    ct_eq, CmacTag, DhEnv, Ec256PrivateKey, Ec256PublicKey, Ec256SharedSecret, Key128, LaCrypto,
    ReportProvider, Sha256Digest, CMAC_SIZE, EC256_COORD_SIZE, SHA256_DIGEST_SIZE,
};
pub use la_error::{LaError, LaResult};
pub use msg::{DhMsg1, DhMsg2, DhMsg3, DhMsg3Body, MSG3_MAX_PROP_SIZE};
pub use proto_spec::{
    derive_target_from_report, self_target, ProtoSpec, LAV2_PROTO_SPEC, PROTO_SPEC_ID_SIZE,
    TARGET_SPEC_WORDS,
};
pub use protocol::{LaProtocol, LaV1, LaV2, LaVersion, MSG2_VERIFIERS};
pub use report::{
    AttributeFlags, Attributes, EnclaveIdentity, Report, ReportBody, ReportData, TargetInfo,
    CONFIG_ID_SIZE, CPU_SVN_SIZE, KEY_ID_SIZE, MEASUREMENT_SIZE, REPORT_DATA_SIZE,
    REPORT_MAC_SIZE,
};
pub use session::{DhHandshakeOutput, DhSession, DhSessionState, Role};

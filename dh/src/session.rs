/*++

Licensed under the Apache-2.0 license.

File Name:

    session.rs

Abstract:

    File contains the Diffie-Hellman local attestation session state
    machine.

--*/

use crate::crypto::{DhEnv, Ec256PrivateKey, Ec256PublicKey, Ec256SharedSecret, Key128};
use crate::kdf::{derive_key, AEK_LABEL, SMK_LABEL};
use crate::msg::{check_prop_len, DhMsg1, DhMsg2, DhMsg3};
use crate::proto_spec::derive_target_from_report;
use crate::protocol::{verify_msg2_any, LaProtocol, LaV1, LaV2, LaVersion};
use crate::report::{EnclaveIdentity, ReportData};
use la_error::{LaError, LaResult};
use log::{debug, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Session role
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    Initiator = 0,
    Responder = 1,
}

impl TryFrom<u32> for Role {
    type Error = LaError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Role::Initiator),
            1 => Ok(Role::Responder),
            _ => Err(LaError::INVALID_PARAMETER),
        }
    }
}

impl From<Role> for u32 {
    fn from(role: Role) -> Self {
        role as u32
    }
}

/// Session state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DhSessionState {
    /// Responder waiting to generate message 1
    ResponderReset,

    /// Responder waiting for message 2
    ResponderWaitM2,

    /// Initiator waiting for message 1
    InitiatorWaitM1,

    /// Initiator waiting for message 3
    InitiatorWaitM3,

    /// Handshake complete
    Active,

    /// Handshake failed
    Error,
}

impl DhSessionState {
    fn initial(role: Role) -> Self {
        match role {
            Role::Initiator => DhSessionState::InitiatorWaitM1,
            Role::Responder => DhSessionState::ResponderReset,
        }
    }
}

/// Secret bearing part of the session
#[derive(Default, Zeroize, ZeroizeOnDrop)]
struct SessionSecrets {
    /// Own ephemeral private key. Held by the responder until message 2.
    prv_key: Ec256PrivateKey,

    /// Own ephemeral public key
    pub_key: Ec256PublicKey,

    /// Peer ephemeral public key. Recorded by the initiator.
    peer_pub_key: Ec256PublicKey,

    /// Session MAC key. Held by the initiator until message 3.
    smk: Key128,

    /// ECDH shared secret. Held by the initiator until message 3.
    shared_key: Ec256SharedSecret,
}

/// Result of a completed handshake
#[derive(Debug)]
pub struct DhHandshakeOutput {
    /// Application encryption key
    pub aek: Key128,

    /// Identity of the peer, taken from its verified report
    pub peer_identity: EnclaveIdentity,
}

/// Errors that survive the session boundary verbatim
const GEN_MSG1_PASS_THROUGH: &[LaError] = &[LaError::OUT_OF_MEMORY];
const PROC_MSG1_PASS_THROUGH: &[LaError] = &[LaError::OUT_OF_MEMORY];
const PROC_MSG2_PASS_THROUGH: &[LaError] = &[LaError::OUT_OF_MEMORY, LaError::KDF_MISMATCH];
const PROC_MSG3_PASS_THROUGH: &[LaError] = &[LaError::OUT_OF_MEMORY];

fn collapse(err: LaError, pass_through: &[LaError]) -> LaError {
    if err.is_public() && pass_through.contains(&err) {
        err
    } else {
        LaError::UNEXPECTED
    }
}

/// One side of a local attestation handshake.
///
/// Not safe for concurrent use. Independent sessions share no state.
pub struct DhSession {
    role: Role,
    state: DhSessionState,
    version: Option<LaVersion>,
    secrets: SessionSecrets,
}

impl core::fmt::Debug for DhSession {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DhSession")
            .field("role", &self.role)
            .field("state", &self.state)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

impl DhSession {
    /// Create a session in the initial state of `role`
    pub fn new(role: Role) -> Self {
        Self {
            role,
            state: DhSessionState::initial(role),
            version: None,
            secrets: SessionSecrets::default(),
        }
    }

    /// Create a session from a raw role value
    pub fn from_raw_role(role: u32) -> LaResult<Self> {
        Ok(Self::new(Role::try_from(role)?))
    }

    /// Reset the session to the initial state of `role`, wiping every secret.
    /// Safe to call in any state.
    pub fn init(&mut self, role: Role) {
        self.secrets.zeroize();
        self.version = None;
        self.role = role;
        self.set_state(DhSessionState::initial(role));
    }

    /// Reset the session from a raw role value. The session is left untouched
    /// if the value is not a valid role.
    pub fn init_raw(&mut self, role: u32) -> LaResult<()> {
        self.init(Role::try_from(role)?);
        Ok(())
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> DhSessionState {
        self.state
    }

    /// Protocol generation agreed on by the handshake so far
    pub fn negotiated_version(&self) -> Option<LaVersion> {
        self.version
    }

    /// True if the session holds no key material other than public keys
    pub fn secrets_cleared(&self) -> bool {
        self.secrets.prv_key.is_zero()
            && self.secrets.smk.is_zero()
            && self.secrets.shared_key.is_zero()
    }

    fn set_state(&mut self, state: DhSessionState) {
        if self.state != state {
            debug!("dh session ({:?}): {:?} -> {:?}", self.role, self.state, state);
        }
        self.state = state;
    }

    /// Wipe the session and park it in the error state
    fn fail(&mut self) {
        self.secrets.zeroize();
        self.version = None;
        self.set_state(DhSessionState::Error);
    }

    /// Role and state gate run before any work. Violations are reported
    /// verbatim.
    fn check(&mut self, role: Role, state: DhSessionState) -> LaResult<()> {
        if self.role != role {
            warn!("dh session: {:?} operation on {:?} session", role, self.role);
            self.fail();
            return Err(LaError::INVALID_PARAMETER);
        }
        if self.state != state {
            warn!(
                "dh session ({:?}): expected state {:?}, found {:?}",
                self.role, state, self.state
            );
            self.fail();
            return Err(LaError::INVALID_STATE);
        }
        Ok(())
    }

    fn reject(&mut self, step: &str, err: LaError, pass_through: &[LaError]) -> LaError {
        warn!("dh session ({:?}): {} failed: {}", self.role, step, err);
        self.fail();
        collapse(err, pass_through)
    }

    /// Responder: generate message 1.
    ///
    /// # Arguments
    ///
    /// * `env` - Environment
    ///
    /// # Returns
    ///
    /// * `DhMsg1` - Message 1 to send to the initiator
    pub fn responder_gen_msg1<E: DhEnv>(&mut self, env: &mut E) -> LaResult<DhMsg1> {
        self.check(Role::Responder, DhSessionState::ResponderReset)?;

        match self.gen_msg1(env) {
            Ok(msg1) => {
                self.set_state(DhSessionState::ResponderWaitM2);
                Ok(msg1)
            }
            Err(err) => Err(self.reject("gen_msg1", err, GEN_MSG1_PASS_THROUGH)),
        }
    }

    fn gen_msg1<E: DhEnv>(&mut self, env: &mut E) -> LaResult<DhMsg1> {
        let report = env.create_report(None, &ReportData::default())?;
        let target = derive_target_from_report(&report)?;

        let (prv_key, pub_key) = env.ecc256_key_pair()?;
        self.secrets.prv_key = prv_key;
        self.secrets.pub_key = pub_key;

        Ok(DhMsg1 {
            g_a: pub_key,
            target,
        })
    }

    /// Initiator: process message 1 with LAv1 and generate message 2.
    pub fn initiator_proc_msg1<E: DhEnv>(
        &mut self,
        env: &mut E,
        msg1: &DhMsg1,
    ) -> LaResult<DhMsg2> {
        self.initiator_proc_msg1_with::<LaV1, E>(env, msg1)
    }

    /// Initiator: process message 1 with LAv2 and generate message 2.
    pub fn lav2_initiator_proc_msg1<E: DhEnv>(
        &mut self,
        env: &mut E,
        msg1: &DhMsg1,
    ) -> LaResult<DhMsg2> {
        self.initiator_proc_msg1_with::<LaV2, E>(env, msg1)
    }

    /// Initiator: process message 1 and generate message 2 with protocol `P`.
    ///
    /// # Arguments
    ///
    /// * `env` - Environment
    /// * `msg1` - Message 1 received from the responder
    ///
    /// # Returns
    ///
    /// * `DhMsg2` - Message 2 to send to the responder
    pub fn initiator_proc_msg1_with<P: LaProtocol, E: DhEnv>(
        &mut self,
        env: &mut E,
        msg1: &DhMsg1,
    ) -> LaResult<DhMsg2> {
        self.check(Role::Initiator, DhSessionState::InitiatorWaitM1)?;

        match self.proc_msg1::<P, E>(env, msg1) {
            Ok(msg2) => {
                debug!("dh session (Initiator): using {:?}", P::VERSION);
                self.set_state(DhSessionState::InitiatorWaitM3);
                Ok(msg2)
            }
            Err(err) => Err(self.reject("proc_msg1", err, PROC_MSG1_PASS_THROUGH)),
        }
    }

    fn proc_msg1<P: LaProtocol, E: DhEnv>(
        &mut self,
        env: &mut E,
        msg1: &DhMsg1,
    ) -> LaResult<DhMsg2> {
        let (prv_key, pub_key) = env.ecc256_key_pair()?;
        let shared_key = env.ecc256_shared_dhkey(&prv_key, &msg1.g_a);
        drop(prv_key);
        let shared_key = shared_key?;

        let smk = derive_key(env, &shared_key, SMK_LABEL)?;
        let msg2 = P::generate_msg2(env, msg1, &pub_key, &smk)?;

        self.secrets.pub_key = pub_key;
        self.secrets.peer_pub_key = msg1.g_a;
        self.secrets.smk = smk;
        self.secrets.shared_key = shared_key;
        self.version = Some(P::VERSION);

        Ok(msg2)
    }

    /// Responder: process message 2, generate message 3 and finish the
    /// handshake.
    ///
    /// Message 2 is accepted in either protocol generation; message 3 is
    /// generated in the generation that verified it.
    ///
    /// # Arguments
    ///
    /// * `env` - Environment
    /// * `msg2` - Message 2 received from the initiator
    /// * `additional_prop` - Opaque bytes to carry in message 3
    ///
    /// # Returns
    ///
    /// * `(DhMsg3, DhHandshakeOutput)` - Message 3 to send to the initiator,
    ///   the application key and the identity of the initiator
    pub fn responder_proc_msg2<E: DhEnv>(
        &mut self,
        env: &mut E,
        msg2: &DhMsg2,
        additional_prop: &[u8],
    ) -> LaResult<(DhMsg3, DhHandshakeOutput)> {
        if self.role == Role::Responder && check_prop_len(additional_prop.len()).is_err() {
            warn!("dh session (Responder): additional prop too large");
            self.fail();
            return Err(LaError::INVALID_PARAMETER);
        }
        self.check(Role::Responder, DhSessionState::ResponderWaitM2)?;

        match self.proc_msg2(env, msg2, additional_prop) {
            Ok((msg3, output, version)) => {
                debug!("dh session (Responder): peer speaks {version:?}");
                self.secrets.zeroize();
                self.version = Some(version);
                self.set_state(DhSessionState::Active);
                Ok((msg3, output))
            }
            Err(err) => Err(self.reject("proc_msg2", err, PROC_MSG2_PASS_THROUGH)),
        }
    }

    fn proc_msg2<E: DhEnv>(
        &mut self,
        env: &mut E,
        msg2: &DhMsg2,
        additional_prop: &[u8],
    ) -> LaResult<(DhMsg3, DhHandshakeOutput, LaVersion)> {
        let shared_key = env.ecc256_shared_dhkey(&self.secrets.prv_key, &msg2.g_b);
        self.secrets.prv_key.zeroize();
        let shared_key = shared_key?;

        let smk = derive_key(env, &shared_key, SMK_LABEL)?;
        let version = verify_msg2_any(env, msg2, &self.secrets.pub_key, &smk)?;

        let peer_identity = EnclaveIdentity::from(&msg2.report.body);
        let msg3 = version.generate_msg3(env, msg2, &self.secrets.pub_key, &smk, additional_prop)?;
        let aek = derive_key(env, &shared_key, AEK_LABEL)?;

        Ok((msg3, DhHandshakeOutput { aek, peer_identity }, version))
    }

    /// Initiator: process message 3 with LAv1 and finish the handshake.
    pub fn initiator_proc_msg3<E: DhEnv>(
        &mut self,
        env: &mut E,
        msg3: &DhMsg3,
    ) -> LaResult<DhHandshakeOutput> {
        self.initiator_proc_msg3_with::<LaV1, E>(env, msg3)
    }

    /// Initiator: process message 3 with LAv2 and finish the handshake.
    pub fn lav2_initiator_proc_msg3<E: DhEnv>(
        &mut self,
        env: &mut E,
        msg3: &DhMsg3,
    ) -> LaResult<DhHandshakeOutput> {
        self.initiator_proc_msg3_with::<LaV2, E>(env, msg3)
    }

    /// Initiator: process message 3 with protocol `P` and finish the
    /// handshake.
    ///
    /// # Arguments
    ///
    /// * `env` - Environment
    /// * `msg3` - Message 3 received from the responder
    ///
    /// # Returns
    ///
    /// * `DhHandshakeOutput` - The application key and the identity of the
    ///   responder
    pub fn initiator_proc_msg3_with<P: LaProtocol, E: DhEnv>(
        &mut self,
        env: &mut E,
        msg3: &DhMsg3,
    ) -> LaResult<DhHandshakeOutput> {
        if self.role == Role::Initiator && msg3.msg3_body.additional_prop_length().is_err() {
            warn!("dh session (Initiator): additional prop too large");
            self.fail();
            return Err(LaError::INVALID_PARAMETER);
        }
        self.check(Role::Initiator, DhSessionState::InitiatorWaitM3)?;

        match self.proc_msg3::<P, E>(env, msg3) {
            Ok(output) => {
                self.secrets.zeroize();
                self.set_state(DhSessionState::Active);
                Ok(output)
            }
            Err(err) => Err(self.reject("proc_msg3", err, PROC_MSG3_PASS_THROUGH)),
        }
    }

    fn proc_msg3<P: LaProtocol, E: DhEnv>(
        &mut self,
        env: &mut E,
        msg3: &DhMsg3,
    ) -> LaResult<DhHandshakeOutput> {
        P::verify_msg3(
            env,
            msg3,
            &self.secrets.peer_pub_key,
            &self.secrets.pub_key,
            &self.secrets.smk,
        )?;

        let aek = derive_key(env, &self.secrets.shared_key, AEK_LABEL)?;
        Ok(DhHandshakeOutput {
            aek,
            peer_identity: EnclaveIdentity::from(&msg3.msg3_body.report.body),
        })
    }
}

#[cfg(all(test, feature = "emu"))]
mod tests {
    use super::*;
    use crate::crypto::{CmacTag, LaCrypto, ReportProvider, Sha256Digest};
    use crate::emu::{EmuEnclave, EmuEnclaveParams, EmuPlatform};
    use crate::report::{Report, TargetInfo};

    /// Wraps an enclave and fails a chosen primitive
    struct FaultyEnv {
        inner: EmuEnclave,
        fail_keygen: Option<LaError>,
        fail_report: Option<LaError>,
    }

    impl FaultyEnv {
        fn new(inner: EmuEnclave) -> Self {
            Self {
                inner,
                fail_keygen: None,
                fail_report: None,
            }
        }
    }

    impl LaCrypto for FaultyEnv {
        fn sha256(&mut self, parts: &[&[u8]]) -> LaResult<Sha256Digest> {
            self.inner.sha256(parts)
        }

        fn cmac128(&mut self, key: &Key128, parts: &[&[u8]]) -> LaResult<CmacTag> {
            self.inner.cmac128(key, parts)
        }

        fn ecc256_key_pair(&mut self) -> LaResult<(Ec256PrivateKey, Ec256PublicKey)> {
            match self.fail_keygen {
                Some(err) => Err(err),
                None => self.inner.ecc256_key_pair(),
            }
        }

        fn ecc256_shared_dhkey(
            &mut self,
            priv_key: &Ec256PrivateKey,
            peer: &Ec256PublicKey,
        ) -> LaResult<Ec256SharedSecret> {
            self.inner.ecc256_shared_dhkey(priv_key, peer)
        }
    }

    impl ReportProvider for FaultyEnv {
        fn create_report(
            &mut self,
            target: Option<&TargetInfo>,
            data: &ReportData,
        ) -> LaResult<Report> {
            match self.fail_report {
                Some(err) => Err(err),
                None => self.inner.create_report(target, data),
            }
        }

        fn verify_report(&mut self, report: &Report) -> LaResult<()> {
            self.inner.verify_report(report)
        }
    }

    fn pair() -> (EmuEnclave, EmuEnclave) {
        let platform = EmuPlatform::new();
        let initiator = EmuEnclave::new(
            platform.clone(),
            EmuEnclaveParams {
                mr_enclave: [0x11; 32],
                ..Default::default()
            },
        );
        let responder = EmuEnclave::new(
            platform,
            EmuEnclaveParams {
                mr_enclave: [0x22; 32],
                ..Default::default()
            },
        );
        (initiator, responder)
    }

    #[test]
    fn test_role_try_from() {
        assert_eq!(Role::try_from(0), Ok(Role::Initiator));
        assert_eq!(Role::try_from(1), Ok(Role::Responder));
        assert_eq!(Role::try_from(2), Err(LaError::INVALID_PARAMETER));
        assert_eq!(u32::from(Role::Responder), 1);
        assert!(DhSession::from_raw_role(7).is_err());
    }

    #[test]
    fn test_initial_states() {
        assert_eq!(
            DhSession::new(Role::Initiator).state(),
            DhSessionState::InitiatorWaitM1
        );
        assert_eq!(
            DhSession::new(Role::Responder).state(),
            DhSessionState::ResponderReset
        );
    }

    #[test]
    fn test_init_raw_invalid_role_leaves_session() {
        let mut session = DhSession::new(Role::Responder);
        assert_eq!(session.init_raw(5), Err(LaError::INVALID_PARAMETER));
        assert_eq!(session.state(), DhSessionState::ResponderReset);
        assert_eq!(session.init_raw(0), Ok(()));
        assert_eq!(session.role(), Role::Initiator);
    }

    #[test]
    fn test_responder_private_key_held_until_msg2() {
        let (_, mut responder_env) = pair();
        let mut responder = DhSession::new(Role::Responder);
        responder.responder_gen_msg1(&mut responder_env).unwrap();
        assert!(!responder.secrets.prv_key.is_zero());
        assert!(responder.secrets.smk.is_zero());
        assert!(responder.secrets.shared_key.is_zero());
    }

    #[test]
    fn test_initiator_holds_smk_until_msg3() {
        let (mut initiator_env, mut responder_env) = pair();
        let mut responder = DhSession::new(Role::Responder);
        let mut initiator = DhSession::new(Role::Initiator);

        let msg1 = responder.responder_gen_msg1(&mut responder_env).unwrap();
        initiator
            .initiator_proc_msg1(&mut initiator_env, &msg1)
            .unwrap();

        assert!(initiator.secrets.prv_key.is_zero());
        assert!(!initiator.secrets.smk.is_zero());
        assert!(!initiator.secrets.shared_key.is_zero());
        assert_eq!(initiator.secrets.peer_pub_key, msg1.g_a);
        assert_eq!(initiator.negotiated_version(), Some(LaVersion::V1));
    }

    #[test]
    fn test_keygen_failure_collapses() {
        let (_, responder_env) = pair();
        let mut env = FaultyEnv::new(responder_env);
        let mut responder = DhSession::new(Role::Responder);

        env.fail_keygen = Some(LaError::CRYPTO_ECC_KEYGEN_FAILURE);
        assert_eq!(
            responder.responder_gen_msg1(&mut env),
            Err(LaError::UNEXPECTED)
        );
        assert_eq!(responder.state(), DhSessionState::Error);
        assert!(responder.secrets_cleared());
    }

    #[test]
    fn test_out_of_memory_passes_through() {
        let (initiator_env, mut responder_env) = pair();
        let mut responder = DhSession::new(Role::Responder);
        let msg1 = responder.responder_gen_msg1(&mut responder_env).unwrap();

        let mut env = FaultyEnv::new(initiator_env);
        env.fail_report = Some(LaError::OUT_OF_MEMORY);
        let mut initiator = DhSession::new(Role::Initiator);
        assert_eq!(
            initiator.initiator_proc_msg1(&mut env, &msg1),
            Err(LaError::OUT_OF_MEMORY)
        );
        assert_eq!(initiator.state(), DhSessionState::Error);
        assert!(initiator.secrets_cleared());
        assert_eq!(initiator.negotiated_version(), None);
    }

    #[test]
    fn test_wrong_role() {
        let (mut initiator_env, _) = pair();
        let mut session = DhSession::new(Role::Initiator);
        assert_eq!(
            session.responder_gen_msg1(&mut initiator_env),
            Err(LaError::INVALID_PARAMETER)
        );
        assert_eq!(session.state(), DhSessionState::Error);
        assert_eq!(session.role(), Role::Initiator);
    }

    #[test]
    fn test_collapse() {
        assert_eq!(
            collapse(LaError::MAC_MISMATCH, PROC_MSG2_PASS_THROUGH),
            LaError::UNEXPECTED
        );
        assert_eq!(
            collapse(LaError::KDF_MISMATCH, PROC_MSG2_PASS_THROUGH),
            LaError::KDF_MISMATCH
        );
        assert_eq!(
            collapse(LaError::KDF_MISMATCH, PROC_MSG3_PASS_THROUGH),
            LaError::UNEXPECTED
        );

        // Diagnostic codes never leave the session.
        assert_eq!(
            collapse(LaError::REPORT_VERIFY_FAILURE, &[LaError::REPORT_VERIFY_FAILURE]),
            LaError::UNEXPECTED
        );
    }
}

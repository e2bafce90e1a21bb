/*++

Licensed under the Apache-2.0 license.

File Name:

    main.rs

Abstract:

    File contains main entrypoint for the local attestation demo. Runs a
    complete handshake between two emulated enclaves on one platform.

--*/

use clap::{Parser, ValueEnum};
use la_dh::emu::{EmuEnclave, EmuEnclaveParams, EmuPlatform};
use la_dh::{
    ct_eq, DhMsg1, DhMsg2, DhMsg3, DhSession, EnclaveIdentity, LaProtocol, LaV1, LaV2, Role,
    MEASUREMENT_SIZE,
};
use la_error::{LaError, LaResult};
use log::{info, LevelFilter};
use simple_logger::SimpleLogger;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Protocol {
    /// LAv1: report data binds both public keys and the KDF-ID
    V1,
    /// LAv2: report data carries the self-describing protocol spec
    V2,
}

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Protocol generation the initiator speaks
    #[arg(long, value_enum, default_value_t = Protocol::V2)]
    protocol: Protocol,

    /// Additional property carried in message 3
    #[arg(long, default_value = "")]
    prop: String,

    /// Log level
    #[arg(long, default_value_t = LevelFilter::Info)]
    log_level: LevelFilter,

    /// Dump the encoded handshake messages
    #[arg(long)]
    show_messages: bool,
}

fn main() {
    let args = Args::parse();
    let _ = SimpleLogger::new().with_level(args.log_level).init();

    let result = match args.protocol {
        Protocol::V1 => handshake::<LaV1>(&args),
        Protocol::V2 => handshake::<LaV2>(&args),
    };
    result.unwrap_or_else(|e| {
        log::error!("Handshake failed: {}", e);
        std::process::exit(1);
    });
}

fn enclave_params(mr_enclave: u8, isv_prod_id: u16, isv_svn: u16) -> EmuEnclaveParams {
    EmuEnclaveParams {
        mr_enclave: [mr_enclave; MEASUREMENT_SIZE],
        mr_signer: [0xa5; MEASUREMENT_SIZE],
        isv_prod_id,
        isv_svn,
        ..Default::default()
    }
}

fn show(args: &Args, name: &str, bytes: &[u8]) {
    if args.show_messages {
        println!("{name} ({} bytes): {}", bytes.len(), hex::encode(bytes));
    }
}

fn describe(who: &str, identity: &EnclaveIdentity) {
    println!(
        "{who}: mr_enclave={} mr_signer={} isv_prod_id={} isv_svn={} attributes={:?}",
        hex::encode(identity.mr_enclave),
        hex::encode(identity.mr_signer),
        identity.isv_prod_id,
        identity.isv_svn,
        identity.attributes.flags(),
    );
}

fn handshake<P: LaProtocol>(args: &Args) -> LaResult<()> {
    let platform = EmuPlatform::new();
    let mut initiator_env = EmuEnclave::new(platform.clone(), enclave_params(0x11, 1, 2));
    let mut responder_env = EmuEnclave::new(platform, enclave_params(0x22, 3, 4));

    let mut initiator = DhSession::new(Role::Initiator);
    let mut responder = DhSession::new(Role::Responder);

    // Every message goes through its wire encoding on the way to the peer.
    let bytes = responder.responder_gen_msg1(&mut responder_env)?.to_bytes();
    show(args, "msg1", &bytes);
    let msg1 = DhMsg1::from_bytes(&bytes)?;

    let bytes = initiator
        .initiator_proc_msg1_with::<P, _>(&mut initiator_env, &msg1)?
        .to_bytes();
    show(args, "msg2", &bytes);
    let msg2 = DhMsg2::from_bytes(&bytes)?;

    let (msg3, responder_out) =
        responder.responder_proc_msg2(&mut responder_env, &msg2, args.prop.as_bytes())?;
    let bytes = msg3.to_bytes()?;
    show(args, "msg3", &bytes);
    let msg3 = DhMsg3::from_bytes(&bytes)?;

    let initiator_out = initiator.initiator_proc_msg3_with::<P, _>(&mut initiator_env, &msg3)?;

    if !ct_eq(&initiator_out.aek.0, &responder_out.aek.0) {
        return Err(LaError::UNEXPECTED);
    }

    info!("Handshake complete");
    if let Some(version) = responder.negotiated_version() {
        println!("protocol: {version:?}");
    }
    describe("initiator sees responder", &initiator_out.peer_identity);
    describe("responder sees initiator", &responder_out.peer_identity);
    println!(
        "additional prop: {:?}",
        String::from_utf8_lossy(&msg3.msg3_body.additional_prop)
    );
    println!("application key established on both sides");
    Ok(())
}

/*++

Licensed under the Apache-2.0 license.

File Name:

    mod.rs

Abstract:

    Software providers for hosts without report hardware.

--*/

mod platform;
mod soft_crypto;

pub use platform::{EmuEnclave, EmuEnclaveParams, EmuPlatform};
pub use soft_crypto::SoftCrypto;

//! Signer Address Utility
//!
//! Prints the address of the signer configured for the SDK. Deployment
//! scripts use it to fund the account before running workflows.
//!
//! ## Usage
//!
//! ```bash
//! LOYALTY_SDK_CONFIG_PATH=config/sdk.toml \
//! LOYALTY_SDK_PRIVATE_KEY=0x... \
//!   cargo run --bin get_signer_address
//! ```

use anyhow::{Context, Result};
use loyalty_sdk::abi::address_hex;
use loyalty_sdk::{ContextParams, Signer};

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let params = ContextParams::load().context("Failed to load SDK configuration")?;
    let key = params
        .signer
        .context("No signer configured (set privateKeyEnv or LOYALTY_SDK_PRIVATE_KEY)")?;
    let signer = Signer::from_private_key(key.expose()).context("Invalid signer private key")?;

    tracing::debug!("Resolved signer from configuration");
    println!("{}", address_hex(&signer.address()));
    Ok(())
}

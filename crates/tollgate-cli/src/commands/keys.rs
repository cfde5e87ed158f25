use std::fs;

use anyhow::{Context, Result};
use tollgate_auth::password::{generate_client_secret, hash_password};
use tollgate_auth::token::generate_rsa_private_key_pem;
use tollgate_auth::types::hash_client_secret;

use crate::cli::{GenerateKeyArgs, HashPasswordArgs};
use crate::output::{print_field, print_success};

pub fn generate_key(args: &GenerateKeyArgs) -> Result<()> {
    let pem = generate_rsa_private_key_pem()?;
    match &args.out {
        Some(path) => {
            fs::write(path, &pem)
                .with_context(|| format!("Cannot write key to {}", path.display()))?;
            print_success(&format!(
                "Wrote RSA private key to {} (set auth.signing.private_key_path)",
                path.display()
            ));
        }
        None => print!("{pem}"),
    }
    Ok(())
}

pub fn generate_secret() {
    let secret = generate_client_secret();
    print_field("client_secret", &secret);
    print_field("hash (deployment file)", &hash_client_secret(&secret));
}

pub fn hash(args: &HashPasswordArgs) -> Result<()> {
    let hash = hash_password(&args.password)
        .map_err(|e| anyhow::anyhow!("Password hashing failed: {e}"))?;
    println!("{hash}");
    Ok(())
}

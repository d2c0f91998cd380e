//! Credential Generation Utility
//!
//! Run with: cargo run --bin generate-credential
//!
//! This generates a new signing key for use as:
//! - Trade signer (SIGNER_KEY)
//! - Relay request authentication (RELAY_AUTH_KEY)

use cycle_sniper::executor::generate_credential;

fn main() {
    println!();
    println!("╔════════════════════════════════════════════════════════════╗");
    println!("║          CYCLE SNIPER CREDENTIAL GENERATOR                 ║");
    println!("╚════════════════════════════════════════════════════════════╝");
    println!();

    let (private_key, address) = generate_credential();

    println!("🔑 NEW CREDENTIAL GENERATED");
    println!();
    println!("   Identity:    {:?}", address);
    println!("   Private Key: {}", private_key);
    println!();
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!();
    println!("⚠️  SECURITY WARNINGS:");
    println!();
    println!("   1. NEVER share your private key with anyone");
    println!("   2. NEVER commit it to git or any public repository");
    println!("   3. Store it securely (password manager, encrypted file)");
    println!();
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!();
    println!("📝 TO USE THIS CREDENTIAL (add to .env):");
    println!();
    println!("   As the trade signer:");
    println!("   SIGNER_KEY={}", private_key);
    println!();
    println!("   As the relay authentication key:");
    println!("   RELAY_AUTH_KEY={}", private_key);
    println!();
    println!("💡 Use separate keys for the two roles. The relay key holds no funds.");
    println!();
}

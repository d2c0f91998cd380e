//! Diagnostic tool - Check system status
//!
//! Run with: cargo run --bin diagnose

use std::env;
use std::path::Path;

use cycle_sniper::cartographer::HistoricalProvider;
use cycle_sniper::config::{Config, ExecutionMode};
use cycle_sniper::tokens::TokenBook;

fn section(title: &str) {
    println!("\n═══════════════════════════════════════════════════");
    println!("  {}", title);
    println!("═══════════════════════════════════════════════════\n");
}

fn mark(ok: bool) -> &'static str {
    if ok {
        "✅"
    } else {
        "❌"
    }
}

fn main() {
    println!("🔍 CYCLE SNIPER DIAGNOSTIC CHECK\n");

    // Load .env
    dotenvy::dotenv().ok();

    section("CONFIGURATION");

    let checks = [
        ("EXECUTION_MODE", "simulation", "What mode are we in?"),
        ("MIN_PROFIT_THRESHOLD", "0.005", "Minimum fractional profit"),
        ("MAX_HOPS", "5", "Maximum hops in a cycle"),
        ("QUOTE_TTL_SECS", "30", "Quote freshness window"),
        ("SCAN_INTERVAL_SECS", "15", "Seconds between live passes"),
        ("ENABLE_RISK_EVALUATION", "true", "Score opportunities?"),
        ("OPPORTUNITY_LOG", "true", "Log opportunities?"),
    ];

    for (key, default, desc) in checks {
        let value = env::var(key).ok();
        let marker = if value.is_some() { "(from .env)" } else { "(default)" };
        println!("  {}: {} {}", key, value.as_deref().unwrap_or(default), marker);
        println!("    └─ {}\n", desc);
    }

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            println!("  ❌ Could not read configuration: {:#}", e);
            return;
        }
    };
    match config.validate() {
        Ok(()) => println!("  ✅ Configuration is valid"),
        Err(e) => println!("  ❌ Configuration invalid: {}", e),
    }

    section("DATA FILES");

    let token_path = Path::new(&config.token_cache_path);
    match TokenBook::load(token_path) {
        Ok(book) => println!("  {} Token cache: {} ({} tokens)", mark(!book.is_empty()), token_path.display(), book.len()),
        Err(e) => println!("  ❌ Token cache: {} ({:#})", token_path.display(), e),
    }

    let dataset_path = Path::new(&config.historical_dataset_path);
    match HistoricalProvider::load(dataset_path) {
        Ok(provider) => println!(
            "  ✅ Historical dataset: {} ({} pairs, newest {})",
            dataset_path.display(),
            provider.pairs().len(),
            provider.as_of()
        ),
        Err(e) => println!("  ❌ Historical dataset: {} ({:#})", dataset_path.display(), e),
    }

    section("EXECUTION READINESS");

    let signer_key = env::var("SIGNER_KEY").is_ok();
    println!("  QUOTE_URL:      {}", config.quote_url);
    println!("  QUOTE_API_KEY:  {}", if config.quote_api_key.is_some() { "✅ Set" } else { "➖ Not set" });
    println!("  RELAY_URL:      {}", if config.relay_url.is_some() { "✅ Set" } else { "❌ Not set" });
    println!("  RELAY_AUTH_KEY: {}", if config.relay_auth_key.is_some() { "✅ Set" } else { "➖ Not set (ephemeral)" });
    println!("  SIGNER_KEY:     {}", if signer_key { "✅ Set" } else { "➖ Not set (prompted)" });

    section("STATUS");

    match config.execution_mode {
        ExecutionMode::Simulation => {
            println!("  📋 SIMULATION MODE");
            println!("     → Opportunities are found and planned, never submitted");
            println!("     → Your money: SAFE");
        }
        ExecutionMode::DryRun => {
            println!("  🔬 DRY RUN MODE");
            println!("     → Signed batches settle against a paper ledger");
            println!("     → Your money: SAFE");
        }
        ExecutionMode::Production => {
            println!("  🚀 PRODUCTION MODE");
            println!("     → Signed batches WILL be submitted to the relay!");
            println!("     → Your money: AT RISK");

            if config.relay_url.is_none() {
                println!("\n  ⚠️  WARNING: Production mode but RELAY_URL is missing!");
                println!("     Executions will be refused until configured.");
            }
            if !config.relay_atomic {
                println!("\n  ⚠️  Relay is not atomic: a failed hop can leave an intermediate token held.");
            }
        }
    }

    if config.min_profit_threshold < 0.002 {
        println!("\n  ⚠️  Low threshold! You'll see many cycles that");
        println!("     may not survive real-world slippage.");
    }

    println!("\n✅ Diagnostic complete!\n");
}

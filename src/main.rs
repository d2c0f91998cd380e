//! Cycle Sniper - control surface
//!
//! Run with: cargo run -- [menu|tokens|historical|live]
//!
//! With no subcommand an interactive menu is shown.

use alloy_primitives::Address;
use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{eyre, Result};
use console::{style, Term};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use cycle_sniper::brain::{print_opportunities, DetectionReport, Opportunity, ScanParams};
use cycle_sniper::cartographer::LiveQuoteProvider;
use cycle_sniper::config::{Config, ExecutionMode};
use cycle_sniper::executor::{
    Credential, ExecutionEngine, ExecutionResult, ExecutionStatus, HopOutcome, PaperBackend, RelayBackend,
    TransactionBuilder, TransactionPlan,
};
use cycle_sniper::logging;
use cycle_sniper::session::{ctrl_c_cancellation, print_graph_summary, AutoExecute, LoopSettings, Session};
use cycle_sniper::tokens::TokenBook;

#[derive(Parser)]
#[command(name = "cycle-sniper")]
#[command(about = "Multi-hop swap-cycle detection and execution")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// TOML config file; environment variables are used otherwise
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    run: RunArgs,
}

#[derive(Args, Clone, Default)]
struct RunArgs {
    /// Minimum fractional profit, e.g. 0.005
    #[arg(long, global = true)]
    threshold: Option<f64>,

    /// Accept every qualifying cycle without a risk score
    #[arg(long, global = true)]
    no_risk: bool,

    /// Trade amount in base-token units
    #[arg(long, global = true)]
    amount: Option<f64>,

    /// simulation, dry_run or production
    #[arg(long, global = true)]
    mode: Option<String>,

    /// Execute the opportunity at this rank (1-based)
    #[arg(long, global = true)]
    execute: Option<usize>,

    /// Public identity the signing key must match
    #[arg(long, global = true)]
    identity: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive menu
    Menu,

    /// Reload the token list from the cache file
    Tokens,

    /// Detect on the historical dataset
    Historical,

    /// Detect on live quotes
    Live {
        /// Keep scanning until Ctrl-C
        #[arg(long)]
        watch: bool,

        /// Execute the best accepted opportunity of every pass (with --watch)
        #[arg(long)]
        auto: bool,

        /// Stop after this many passes (with --watch)
        #[arg(long)]
        passes: Option<usize>,
    },
}

fn print_banner() {
    println!();
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!(
        "{}",
        style(" 🎯 CYCLE SNIPER - Multi-Hop Arbitrage Detection").cyan().bold()
    );
    println!(
        "{}",
        style("    Bellman-Ford | Triangle | Two-Hop | Exhaustive DFS").cyan()
    );
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!();
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    logging::init("cycle_sniper=info")?;

    print_banner();

    let cli = Cli::parse();

    // Load configuration
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    apply_overrides(&mut config, &cli.run)?;

    // Validate configuration
    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        error!("Please check your .env file");
        return Err(e);
    }

    config.print_summary();
    println!();

    let session = Session::load(config);

    match cli.command.unwrap_or(Command::Menu) {
        Command::Menu => run_menu(&session, &cli.run).await,
        Command::Tokens => refresh_tokens(&session).await,
        Command::Historical => {
            let scan = session.config().scan_params();
            let report = session.run_historical(&scan).await?;
            show_report(&session, &report, &scan).await;
            if let Some(rank) = cli.run.execute {
                execute_selected(&session, &report, rank, None, cli.run.identity.as_deref()).await?;
            }
            Ok(())
        }
        Command::Live { watch, auto, passes } => {
            let scan = session.config().scan_params();
            if watch {
                run_watch(&session, &scan, auto, passes, cli.run.identity.as_deref()).await
            } else {
                let report = session.run_live_pass(live_provider(session.config())?, &scan, true).await?;
                show_report(&session, &report, &scan).await;
                if let Some(rank) = cli.run.execute {
                    execute_selected(&session, &report, rank, None, cli.run.identity.as_deref()).await?;
                }
                Ok(())
            }
        }
    }
}

/// CLI flags win over file and environment values
fn apply_overrides(config: &mut Config, run: &RunArgs) -> Result<()> {
    if let Some(threshold) = run.threshold {
        config.min_profit_threshold = threshold;
    }
    if run.no_risk {
        config.enable_risk_evaluation = false;
    }
    if let Some(amount) = run.amount {
        config.base_amount = amount;
    }
    if let Some(mode) = &run.mode {
        config.execution_mode = mode.parse()?;
    }
    Ok(())
}

fn live_provider(config: &Config) -> Result<Arc<LiveQuoteProvider>> {
    Ok(Arc::new(LiveQuoteProvider::new(
        config.quote_url.clone(),
        config.quote_api_key.clone(),
        config.request_timeout(),
    )?))
}

async fn refresh_tokens(session: &Session) -> Result<()> {
    match session.refresh_tokens().await {
        Ok(count) => {
            println!("{} Token list updated: {} tokens", style("✓").green(), count);
            Ok(())
        }
        Err(e) => {
            println!("{} Token update failed: {:#}", style("✗").red(), e);
            Err(e)
        }
    }
}

async fn show_report(session: &Session, report: &DetectionReport, scan: &ScanParams) {
    let tokens = session.tokens().await;
    println!();
    println!("{}", style("═══ DETECTION ═══").magenta().bold());
    for (engine, count) in &report.per_engine {
        println!("   {:<14} {} cycles", engine.to_string(), count);
    }
    println!(
        "{} {} candidates merged into {} opportunities (threshold {:.3}%)",
        style("✓").green(),
        report.raw_candidates,
        report.opportunities.len(),
        scan.threshold * 100.0
    );
    print_opportunities(report, &tokens, report.opportunities.len());

    let snapshot = session.snapshot(report.as_of).await;
    print_graph_summary(&snapshot, &tokens);
}

// ============================================
// INTERACTIVE MENU
// ============================================

fn prompt(term: &Term, text: &str, default: &str) -> Result<String> {
    term.write_str(&format!("{} [default: {}]: ", text, default))?;
    let line = term.read_line()?;
    let line = line.trim();
    Ok(if line.is_empty() { default.to_string() } else { line.to_string() })
}

fn prompt_f64(term: &Term, text: &str, default: f64) -> Result<f64> {
    loop {
        let raw = prompt(term, text, &default.to_string())?;
        match raw.parse::<f64>() {
            Ok(v) if v.is_finite() => return Ok(v),
            _ => println!("{}", style("❌ Please enter a number.").red()),
        }
    }
}

/// Threshold, risk and amount for one menu run
///
/// Each value is asked again until the scan parameters validate.
fn prompt_scan(term: &Term, config: &Config) -> Result<ScanParams> {
    let mut scan = config.scan_params();
    loop {
        scan.threshold = prompt_f64(term, "Minimum profit threshold (e.g. 0.005)", config.min_profit_threshold)?;
        match scan.validate() {
            Ok(()) => break,
            Err(e) => println!("{}", style(format!("❌ {}", e)).red()),
        }
    }

    let risk = prompt(term, "Enable risk evaluation? (y/n)", "y")?.to_lowercase() != "n";
    scan.min_confidence = risk.then_some(config.min_confidence);

    loop {
        scan.trade_amount = prompt_f64(term, "Base token amount for simulation", config.base_amount)?;
        match scan.validate() {
            Ok(()) => break,
            Err(e) => println!("{}", style(format!("❌ {}", e)).red()),
        }
    }
    Ok(scan)
}

async fn run_menu(session: &Session, run: &RunArgs) -> Result<()> {
    let term = Term::stdout();
    loop {
        println!();
        println!("{}", style("Cycle Sniper").cyan().bold());
        println!("1) Update token list");
        println!("2) Historical arbitrage");
        println!("3) Live data and trade");
        println!("q) Quit");

        let choice = prompt(&term, "Choose an option", "q")?.to_lowercase();
        let outcome = match choice.as_str() {
            "1" => refresh_tokens(session).await,
            "2" => {
                let scan = prompt_scan(&term, session.config())?;
                match session.run_historical(&scan).await {
                    Ok(report) => {
                        show_report(session, &report, &scan).await;
                        offer_trade(&term, session, &report, run).await
                    }
                    Err(e) => Err(e),
                }
            }
            "3" => {
                let scan = prompt_scan(&term, session.config())?;
                println!(
                    "{}",
                    style("⚠️  Free quote endpoints may be unreliable or rate-limited.").yellow()
                );
                let pass = match live_provider(session.config()) {
                    Ok(provider) => session.run_live_pass(provider, &scan, true).await,
                    Err(e) => Err(e),
                };
                match pass {
                    Ok(report) => {
                        show_report(session, &report, &scan).await;
                        offer_trade(&term, session, &report, run).await
                    }
                    Err(e) => Err(e),
                }
            }
            "q" | "quit" => {
                println!("Exiting... Goodbye!");
                return Ok(());
            }
            _ => {
                println!("{}", style("❌ Invalid option. Please try again.").red());
                Ok(())
            }
        };

        if let Err(e) = outcome {
            error!("{:#}", e);
        }
    }
}

async fn offer_trade(term: &Term, session: &Session, report: &DetectionReport, run: &RunArgs) -> Result<()> {
    if report.opportunities.is_empty() {
        return Ok(());
    }
    loop {
        let choice = prompt(term, "Would you like to execute a trade? (y/n)", "n")?.to_lowercase();
        match choice.as_str() {
            "n" => {
                println!("No trade executed.");
                return Ok(());
            }
            "y" => break,
            _ => println!("{}", style("❌ Please enter 'y' or 'n'.").red()),
        }
    }

    println!("{}", style("⚠️  Make sure the account holds enough for fees.").yellow());
    println!(
        "{}",
        style("⚠️  An underfunded hop can leave you holding an intermediate token.").yellow()
    );
    let n = report.opportunities.len();
    let rank = prompt(term, &format!("Which opportunity? (1 to {})", n), "1")?;
    let rank: usize = rank.parse().map_err(|_| eyre!("'{}' is not a rank", rank))?;
    let amount = prompt_f64(term, "Starting token amount", session.config().base_amount)?;
    let identity = match &run.identity {
        Some(id) => id.clone(),
        None => prompt(term, "Public identity (address)", "skip")?,
    };
    let identity = (identity != "skip").then_some(identity);

    execute_selected(session, report, rank, Some(amount), identity.as_deref()).await
}

// ============================================
// EXECUTION
// ============================================

fn load_credential() -> Result<Credential> {
    let key = match env::var("SIGNER_KEY") {
        Ok(key) if !key.trim().is_empty() => key,
        _ => {
            let term = Term::stdout();
            term.write_str("Signing key (hex): ")?;
            term.read_secure_line()?
        }
    };
    Ok(Credential::from_hex(&key)?)
}

fn build_engine(session: &Session, tokens: &TokenBook) -> Result<Option<(ExecutionEngine, Option<Arc<PaperBackend>>)>> {
    let config = session.config();
    let builder = TransactionBuilder::new(
        config.max_slippage,
        config.gas_unit_price,
        config.base_token_addresses(tokens),
    );

    match config.execution_mode {
        ExecutionMode::Simulation => Ok(None),
        ExecutionMode::DryRun => {
            let paper = Arc::new(PaperBackend::new(config.relay_atomic));
            let engine = ExecutionEngine::new(paper.clone(), builder, config.retry_policy());
            Ok(Some((engine, Some(paper))))
        }
        ExecutionMode::Production => {
            let url = config
                .relay_url
                .as_deref()
                .ok_or_else(|| eyre!("Production mode requires RELAY_URL"))?;
            let auth = match &config.relay_auth_key {
                Some(key) => Credential::from_hex(key)?,
                None => {
                    let (key, address) = cycle_sniper::executor::generate_credential();
                    warn!("No RELAY_AUTH_KEY set; using ephemeral relay identity {:?}", address);
                    Credential::from_hex(&key)?
                }
            };
            let relay = RelayBackend::new(url, auth, config.relay_atomic, config.request_timeout())?;
            Ok(Some((ExecutionEngine::new(Arc::new(relay), builder, config.retry_policy()), None)))
        }
    }
}

async fn execute_selected(
    session: &Session,
    report: &DetectionReport,
    rank: usize,
    amount: Option<f64>,
    identity: Option<&str>,
) -> Result<()> {
    let opportunity: &Opportunity = rank
        .checked_sub(1)
        .and_then(|i| report.opportunities.get(i))
        .ok_or_else(|| eyre!("Invalid opportunity index {}", rank))?;
    let amount = amount.unwrap_or(session.config().base_amount);

    let tokens = session.tokens().await;
    println!();
    println!("{}", style("═══ THE EXECUTOR ═══").yellow().bold());
    println!("   Path: {}", style(opportunity.format_path(&tokens)).cyan());

    let Some((engine, paper)) = build_engine(session, &tokens)? else {
        println!("{} {} mode: printing the plan only", style("📋").cyan(), style("SIMULATION").cyan().bold());
        let builder = TransactionBuilder::new(
            session.config().max_slippage,
            session.config().gas_unit_price,
            session.config().base_token_addresses(&tokens),
        );
        match builder.build(opportunity, amount) {
            Ok(plan) => print_plan(&plan, &tokens),
            Err(e) => println!("{} {}", style("✗").red(), e),
        }
        return Ok(());
    };

    let identity = identity
        .map(|id| id.parse::<Address>().map_err(|e| eyre!("Invalid identity '{}': {}", id, e)))
        .transpose()?;
    let credential = load_credential()?;

    if let Some(paper) = &paper {
        let plan = engine.preview(opportunity, amount)?;
        paper.deposit(credential.address(), plan.base_token, amount);
        info!("Paper account funded with {} {}", amount, tokens.format_token(&plan.base_token));
    }

    match engine.execute(opportunity, amount, &credential, identity).await {
        Ok(result) => print_result(&result, &tokens),
        Err(e) => println!("{} Not executed: {}", style("✗").red(), e),
    }
    Ok(())
}

async fn run_watch(
    session: &Session,
    scan: &ScanParams,
    auto: bool,
    passes: Option<usize>,
    identity: Option<&str>,
) -> Result<()> {
    let settings = LoopSettings {
        interval: Duration::from_secs(session.config().scan_interval_secs.max(1)),
        max_passes: passes,
    };
    let cancel = ctrl_c_cancellation();
    let provider = live_provider(session.config())?;

    let engine = if auto {
        let tokens = session.tokens().await;
        build_engine(session, &tokens)?
    } else {
        None
    };
    let credential = match &engine {
        Some(_) => Some(load_credential()?),
        None => None,
    };
    let identity = identity
        .map(|id| id.parse::<Address>().map_err(|e| eyre!("Invalid identity '{}': {}", id, e)))
        .transpose()?;

    // Any token can start a cycle, so the paper account holds the base amount of each
    if let (Some((_, Some(paper))), Some(credential)) = (&engine, &credential) {
        let amount = session.config().base_amount;
        for token in session.tokens().await.addresses() {
            paper.deposit(credential.address(), token, amount);
        }
        info!("Paper account funded with {} of every listed token", amount);
    }

    let auto = match (&engine, &credential) {
        (Some((engine, _)), Some(credential)) => Some(AutoExecute {
            engine,
            credential,
            identity,
        }),
        _ => None,
    };

    let summary = session.run_live_loop(provider, scan, settings, auto, cancel).await?;
    let tokens = session.tokens().await;
    for result in &summary.executions {
        print_result(result, &tokens);
    }
    Ok(())
}

fn print_plan(plan: &TransactionPlan, tokens: &TokenBook) {
    for ix in &plan.instructions {
        println!(
            "   Hop {}: {:.6} {} → {} (expect {:.6}, min {:.6})",
            ix.hop + 1,
            ix.amount_in,
            tokens.format_token(&ix.from),
            tokens.format_token(&ix.to),
            ix.expected_out,
            ix.min_out
        );
    }
    println!(
        "   Expected final {:.6}, gas {:.6}, net {:+.6}",
        plan.expected_final, plan.gas_cost, plan.expected_net
    );
}

fn print_result(result: &ExecutionResult, tokens: &TokenBook) {
    let status = match result.status {
        ExecutionStatus::Success => style(result.status.to_string()).green().bold(),
        ExecutionStatus::PartialExecution => style(result.status.to_string()).red().bold(),
        ExecutionStatus::Unresolved => style(result.status.to_string()).red().bold(),
        ExecutionStatus::Failed => style(result.status.to_string()).yellow().bold(),
    };
    println!("   Status: {}", status);
    for hop in &result.hops {
        let outcome = match &hop.outcome {
            HopOutcome::Committed { signature, amount_out } => format!("✓ {} (out {:.6})", signature, amount_out),
            HopOutcome::Failed { error } => format!("✗ {}", error),
            HopOutcome::Unresolved { signature } => format!("? {} unresolved", signature),
            HopOutcome::Skipped => "- skipped".to_string(),
        };
        println!(
            "   Hop {}: {} → {}  {}",
            hop.hop + 1,
            tokens.format_token(&hop.from),
            tokens.format_token(&hop.to),
            outcome
        );
    }
    let label = if result.status == ExecutionStatus::Unresolved {
        "Last confirmed position"
    } else {
        "Holding"
    };
    println!(
        "   {} {:.6} {}",
        label,
        result.held_amount,
        tokens.format_token(&result.held_token)
    );
    if let Some(error) = &result.error {
        println!("   Error: {}", style(error).red());
    }
}

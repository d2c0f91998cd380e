//! Configuration for the cycle sniper
//!
//! Values come from the environment (with `.env` support) or a TOML file,
//! and are validated once before anything runs.

use alloy_primitives::Address;
use eyre::{Result, WrapErr};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::brain::{DetectionSettings, EngineToggles, Opportunity, RiskParams, RiskWeights, ScanParams};
use crate::cartographer::CollectorSettings;
use crate::executor::RetryPolicy;
use crate::tokens::{resolve_token, TokenBook};

/// Upper bound on the quote freshness window (one day)
pub const MAX_QUOTE_TTL_SECS: u64 = 86_400;

// ============================================
// EXECUTION MODE
// ============================================

/// Execution mode determines what happens to a selected opportunity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ExecutionMode {
    /// Detect and print plans, never execute
    #[default]
    Simulation,

    /// Execute against the in-memory paper backend
    DryRun,

    /// Submit signed batches to the relay
    /// CAUTION: This uses real funds!
    Production,
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionMode::Simulation => write!(f, "SIMULATION"),
            ExecutionMode::DryRun => write!(f, "DRY_RUN"),
            ExecutionMode::Production => write!(f, "PRODUCTION"),
        }
    }
}

impl FromStr for ExecutionMode {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "simulation" | "sim" => Ok(ExecutionMode::Simulation),
            "dry_run" | "dryrun" | "paper" => Ok(ExecutionMode::DryRun),
            "production" | "prod" => Ok(ExecutionMode::Production),
            other => Err(eyre::eyre!("Unknown execution mode '{}'", other)),
        }
    }
}

// ============================================
// MAIN CONFIGURATION
// ============================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // ========== Data Sources ==========
    /// Token cache (JSON array of {address, symbol, decimals})
    pub token_cache_path: String,

    /// Historical quote dataset
    pub historical_dataset_path: String,

    /// Live quote endpoint
    pub quote_url: String,

    /// Optional key sent as `x-api-key`
    pub quote_api_key: Option<String>,

    /// Seconds before a quote is ignored by the engines
    pub quote_ttl_secs: u64,

    // ========== Rate Limiting ==========
    pub max_quote_requests_per_sec: f64,
    pub max_concurrent_quotes: usize,
    pub quote_retries: u32,
    pub backoff_base_ms: u64,
    pub request_timeout_secs: u64,

    // ========== Detection ==========
    /// Minimum fractional profit (0.005 = 0.5%)
    pub min_profit_threshold: f64,
    pub max_hops: usize,
    pub dfs_max_hops: usize,
    pub dfs_pruning: bool,
    pub enable_bellman_ford: bool,
    pub enable_triangle: bool,
    pub enable_two_hop: bool,
    pub enable_dfs: bool,

    /// Symbols or addresses; empty means every token may start a cycle
    pub base_tokens: Vec<String>,

    /// Base-token units per gas unit
    pub gas_unit_price: f64,

    // ========== Risk ==========
    pub enable_risk_evaluation: bool,
    pub min_confidence: f64,
    pub risk_weight_liquidity: f64,
    pub risk_weight_gas: f64,
    pub risk_weight_complexity: f64,
    pub risk_weight_freshness: f64,
    pub hop_decay: f64,
    pub liquidity_multiple: f64,

    // ========== Execution ==========
    pub execution_mode: ExecutionMode,

    /// Trade size in base-token units
    pub base_amount: f64,

    /// Maximum slippage tolerance (0.01 = 1%)
    pub max_slippage: f64,

    pub relay_url: Option<String>,

    /// Key that signs relay requests (KEEP SECRET!)
    /// Separate from the key that signs swaps
    pub relay_auth_key: Option<String>,

    /// Relay lands whole batches atomically
    pub relay_atomic: bool,

    pub max_submit_retries: u32,
    pub confirm_attempts: u32,

    // ========== Live Loop ==========
    pub scan_interval_secs: u64,

    // ========== Logging ==========
    pub opportunity_log: bool,
    pub opportunity_log_path: String,
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_list(key: &str) -> Option<Vec<String>> {
    env::var(key).ok().map(|s| {
        s.split(',')
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect()
    })
}

impl Config {
    /// Load configuration from environment variables and .env file
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let d = Self::default();

        Ok(Self {
            // Data sources
            token_cache_path: env::var("TOKEN_CACHE_PATH").unwrap_or(d.token_cache_path),
            historical_dataset_path: env::var("HISTORICAL_DATASET_PATH").unwrap_or(d.historical_dataset_path),
            quote_url: env::var("QUOTE_URL").unwrap_or(d.quote_url),
            quote_api_key: env::var("QUOTE_API_KEY").ok().filter(|k| !k.is_empty()),
            quote_ttl_secs: env_parse("QUOTE_TTL_SECS", d.quote_ttl_secs),

            // Rate limiting
            max_quote_requests_per_sec: env_parse("MAX_QUOTE_REQUESTS_PER_SEC", d.max_quote_requests_per_sec),
            max_concurrent_quotes: env_parse("MAX_CONCURRENT_QUOTES", d.max_concurrent_quotes),
            quote_retries: env_parse("QUOTE_RETRIES", d.quote_retries),
            backoff_base_ms: env_parse("BACKOFF_BASE_MS", d.backoff_base_ms),
            request_timeout_secs: env_parse("REQUEST_TIMEOUT_SECS", d.request_timeout_secs),

            // Detection
            min_profit_threshold: env_parse("MIN_PROFIT_THRESHOLD", d.min_profit_threshold),
            max_hops: env_parse("MAX_HOPS", d.max_hops),
            dfs_max_hops: env_parse("DFS_MAX_HOPS", d.dfs_max_hops),
            dfs_pruning: env_parse("DFS_PRUNING", d.dfs_pruning),
            enable_bellman_ford: env_parse("ENABLE_BELLMAN_FORD", d.enable_bellman_ford),
            enable_triangle: env_parse("ENABLE_TRIANGLE", d.enable_triangle),
            enable_two_hop: env_parse("ENABLE_TWO_HOP", d.enable_two_hop),
            enable_dfs: env_parse("ENABLE_DFS", d.enable_dfs),
            base_tokens: env_list("BASE_TOKENS").unwrap_or(d.base_tokens),
            gas_unit_price: env_parse("GAS_UNIT_PRICE", d.gas_unit_price),

            // Risk
            enable_risk_evaluation: env_parse("ENABLE_RISK_EVALUATION", d.enable_risk_evaluation),
            min_confidence: env_parse("MIN_CONFIDENCE", d.min_confidence),
            risk_weight_liquidity: env_parse("RISK_WEIGHT_LIQUIDITY", d.risk_weight_liquidity),
            risk_weight_gas: env_parse("RISK_WEIGHT_GAS", d.risk_weight_gas),
            risk_weight_complexity: env_parse("RISK_WEIGHT_COMPLEXITY", d.risk_weight_complexity),
            risk_weight_freshness: env_parse("RISK_WEIGHT_FRESHNESS", d.risk_weight_freshness),
            hop_decay: env_parse("HOP_DECAY", d.hop_decay),
            liquidity_multiple: env_parse("LIQUIDITY_MULTIPLE", d.liquidity_multiple),

            // Execution
            execution_mode: env::var("EXECUTION_MODE")
                .ok()
                .and_then(|m| m.parse().ok())
                .unwrap_or(d.execution_mode),
            base_amount: env_parse("BASE_AMOUNT", d.base_amount),
            max_slippage: env_parse("MAX_SLIPPAGE", d.max_slippage),
            relay_url: env::var("RELAY_URL").ok().filter(|u| !u.is_empty()),
            relay_auth_key: env::var("RELAY_AUTH_KEY").ok().filter(|k| !k.is_empty()),
            relay_atomic: env_parse("RELAY_ATOMIC", d.relay_atomic),
            max_submit_retries: env_parse("MAX_SUBMIT_RETRIES", d.max_submit_retries),
            confirm_attempts: env_parse("CONFIRM_ATTEMPTS", d.confirm_attempts),

            // Live loop
            scan_interval_secs: env_parse("SCAN_INTERVAL_SECS", d.scan_interval_secs),

            // Logging
            opportunity_log: env_parse("OPPORTUNITY_LOG", d.opportunity_log),
            opportunity_log_path: env::var("OPPORTUNITY_LOG_PATH").unwrap_or(d.opportunity_log_path),
        })
    }

    /// Load configuration from a TOML file; missing keys take defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .wrap_err_with(|| format!("reading config {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .wrap_err_with(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if !self.min_profit_threshold.is_finite() || self.min_profit_threshold < 0.0 {
            return Err(eyre::eyre!(
                "MIN_PROFIT_THRESHOLD must be >= 0 (currently {})",
                self.min_profit_threshold
            ));
        }
        if !(2..=6).contains(&self.max_hops) {
            return Err(eyre::eyre!("MAX_HOPS must be between 2 and 6 (currently {})", self.max_hops));
        }
        if !(2..=6).contains(&self.dfs_max_hops) {
            return Err(eyre::eyre!(
                "DFS_MAX_HOPS must be between 2 and 6 (currently {})",
                self.dfs_max_hops
            ));
        }
        if !(0.0..1.0).contains(&self.max_slippage) {
            return Err(eyre::eyre!("MAX_SLIPPAGE must be in [0, 1) (currently {})", self.max_slippage));
        }
        if self.quote_ttl_secs == 0 || self.quote_ttl_secs > MAX_QUOTE_TTL_SECS {
            return Err(eyre::eyre!(
                "QUOTE_TTL_SECS must be between 1 and {} (currently {})",
                MAX_QUOTE_TTL_SECS,
                self.quote_ttl_secs
            ));
        }
        if !self.max_quote_requests_per_sec.is_finite()
            || self.max_quote_requests_per_sec <= 0.0
            || self.max_concurrent_quotes == 0
        {
            return Err(eyre::eyre!("Quote rate limits must be finite and > 0"));
        }
        if !self.base_amount.is_finite() || self.base_amount <= 0.0 {
            return Err(eyre::eyre!("BASE_AMOUNT must be > 0 (currently {})", self.base_amount));
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(eyre::eyre!("MIN_CONFIDENCE must be in [0, 1] (currently {})", self.min_confidence));
        }
        let weights = self.risk_weights();
        if [weights.liquidity, weights.gas, weights.complexity, weights.freshness]
            .iter()
            .any(|w| !w.is_finite() || *w < 0.0)
            || weights.liquidity + weights.gas + weights.complexity + weights.freshness <= 0.0
        {
            return Err(eyre::eyre!("Risk weights must be non-negative and not all zero"));
        }
        if !(self.hop_decay > 0.0 && self.hop_decay <= 1.0) {
            return Err(eyre::eyre!("HOP_DECAY must be in (0, 1] (currently {})", self.hop_decay));
        }
        if !self.liquidity_multiple.is_finite() || self.liquidity_multiple <= 0.0 {
            return Err(eyre::eyre!(
                "LIQUIDITY_MULTIPLE must be finite and > 0 (currently {})",
                self.liquidity_multiple
            ));
        }
        if self.confirm_attempts == 0 {
            return Err(eyre::eyre!("CONFIRM_ATTEMPTS must be > 0"));
        }

        // Production mode requires additional settings
        if self.execution_mode == ExecutionMode::Production && self.relay_url.is_none() {
            return Err(eyre::eyre!("Production mode requires RELAY_URL"));
        }

        Ok(())
    }

    // ============================================
    // DERIVED SETTINGS
    // ============================================

    pub fn quote_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.quote_ttl_secs.min(MAX_QUOTE_TTL_SECS) as i64)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn collector_settings(&self, show_progress: bool) -> CollectorSettings {
        CollectorSettings {
            max_concurrent: self.max_concurrent_quotes,
            requests_per_sec: self.max_quote_requests_per_sec,
            max_retries: self.quote_retries,
            backoff_base: Duration::from_millis(self.backoff_base_ms),
            show_progress,
        }
    }

    /// Base tokens that resolve against the token book
    pub fn base_token_addresses(&self, tokens: &TokenBook) -> Vec<Address> {
        self.base_tokens
            .iter()
            .filter_map(|t| resolve_token(tokens, t))
            .collect()
    }

    pub fn detection_settings(&self, tokens: &TokenBook) -> DetectionSettings {
        DetectionSettings {
            max_hops: self.max_hops,
            dfs_max_hops: self.dfs_max_hops,
            dfs_pruning: self.dfs_pruning,
            engines: EngineToggles {
                bellman_ford: self.enable_bellman_ford,
                triangle: self.enable_triangle,
                two_hop: self.enable_two_hop,
                dfs: self.enable_dfs,
            },
            base_tokens: self.base_token_addresses(tokens),
            gas_unit_price: self.gas_unit_price,
        }
    }

    pub fn risk_weights(&self) -> RiskWeights {
        RiskWeights {
            liquidity: self.risk_weight_liquidity,
            gas: self.risk_weight_gas,
            complexity: self.risk_weight_complexity,
            freshness: self.risk_weight_freshness,
        }
    }

    pub fn risk_params(&self) -> RiskParams {
        RiskParams {
            weights: self.risk_weights(),
            hop_decay: self.hop_decay,
            liquidity_multiple: self.liquidity_multiple,
            quote_ttl: self.quote_ttl(),
        }
    }

    pub fn scan_params(&self) -> ScanParams {
        ScanParams {
            threshold: self.min_profit_threshold,
            trade_amount: self.base_amount,
            min_confidence: self.enable_risk_evaluation.then_some(self.min_confidence),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_submit_retries: self.max_submit_retries,
            confirm_attempts: self.confirm_attempts,
            ..RetryPolicy::default()
        }
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        let on_off = |b: bool| if b { "✓ Enabled" } else { "✗ Disabled" };
        println!("╔════════════════════════════════════════════════════════════╗");
        println!("║             CYCLE SNIPER - CONFIGURATION                   ║");
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ Execution Mode:    {:^40} ║", self.execution_mode);
        println!("║ Base Amount:       {:^40} ║", self.base_amount);
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ DETECTION                                                  ║");
        println!("║ • Min Profit:      {:>38.3}% ║", self.min_profit_threshold * 100.0);
        println!("║ • Max Hops:        {:^40} ║", self.max_hops);
        println!("║ • DFS Depth:       {:^40} ║", self.dfs_max_hops.min(self.max_hops));
        println!("║ • Base Tokens:     {:^40} ║", self.base_tokens.len());
        println!("║ • Quote TTL:       {:>37}s ║", self.quote_ttl_secs);
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ RISK                                                       ║");
        println!("║ • Evaluation:      {:^40} ║", on_off(self.enable_risk_evaluation));
        println!("║ • Min Confidence:  {:^40.2} ║", self.min_confidence);
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ QUOTES                                                     ║");
        println!("║ • Requests/sec:    {:^40} ║", self.max_quote_requests_per_sec);
        println!("║ • Concurrency:     {:^40} ║", self.max_concurrent_quotes);
        println!("║ • API Key:         {:^40} ║",
            if self.quote_api_key.is_some() { "✓ Configured" } else { "✗ Not Set" }
        );
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ EXECUTION                                                  ║");
        println!("║ • Max Slippage:    {:>38.2}% ║", self.max_slippage * 100.0);
        println!("║ • Relay:           {:^40} ║",
            if self.relay_url.is_some() { "✓ Configured" } else { "✗ Not Set" }
        );
        println!("║ • Atomic Batches:  {:^40} ║", on_off(self.relay_atomic));
        println!("║ • Opportunity Log: {:^40} ║", on_off(self.opportunity_log));
        println!("╚════════════════════════════════════════════════════════════╝");
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            token_cache_path: "./data/tokens.json".to_string(),
            historical_dataset_path: "./data/historical_quotes.json".to_string(),
            quote_url: "http://127.0.0.1:8080/quote".to_string(),
            quote_api_key: None,
            quote_ttl_secs: 30,
            max_quote_requests_per_sec: 10.0,
            max_concurrent_quotes: 8,
            quote_retries: 2,
            backoff_base_ms: 250,
            request_timeout_secs: 10,
            min_profit_threshold: 0.005,
            max_hops: 5,
            dfs_max_hops: 5,
            dfs_pruning: true,
            enable_bellman_ford: true,
            enable_triangle: true,
            enable_two_hop: true,
            enable_dfs: true,
            base_tokens: vec![],
            gas_unit_price: 1e-9,
            enable_risk_evaluation: true,
            min_confidence: 0.5,
            risk_weight_liquidity: 0.35,
            risk_weight_gas: 0.30,
            risk_weight_complexity: 0.20,
            risk_weight_freshness: 0.15,
            hop_decay: 0.9,
            liquidity_multiple: 100.0,
            execution_mode: ExecutionMode::Simulation,
            base_amount: 10.0,
            max_slippage: 0.01,
            relay_url: None,
            relay_auth_key: None,
            relay_atomic: true,
            max_submit_retries: 3,
            confirm_attempts: 10,
            scan_interval_secs: 15,
            opportunity_log: true,
            opportunity_log_path: "./logs/opportunities.log".to_string(),
        }
    }
}

// ============================================
// OPPORTUNITY LOGGER
// ============================================

use chrono::{DateTime, Utc};
use std::io::Write;

/// One line of the opportunity log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpportunityLog {
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub path: Vec<String>,
    pub engines: Vec<String>,
    pub hops: usize,
    pub trade_amount: f64,
    pub profit_pct: f64,
    pub gross_profit: f64,
    pub gas_cost: f64,
    pub net_profit: f64,
    pub confidence: Option<f64>,
    pub accepted: bool,
}

impl OpportunityLog {
    pub fn from_opportunity(opportunity: &Opportunity, tokens: &TokenBook, source: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            source: source.to_string(),
            path: opportunity
                .cycle
                .path()
                .iter()
                .map(|a| tokens.format_token(a))
                .collect(),
            engines: opportunity.found_by.iter().map(|e| e.to_string()).collect(),
            hops: opportunity.cycle.hop_count(),
            trade_amount: opportunity.trade_amount,
            profit_pct: opportunity.cycle.profit_percentage(),
            gross_profit: opportunity.gross_profit,
            gas_cost: opportunity.gas_cost,
            net_profit: opportunity.net_profit,
            confidence: opportunity.confidence(),
            accepted: opportunity.accepted,
        }
    }

    /// Append this log to a file
    pub fn append_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        // Create parent directories if needed
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;

        let json = serde_json::to_string(self)?;
        writeln!(file, "{}", json)?;

        Ok(())
    }
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokens::Token;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.execution_mode, ExecutionMode::Simulation);
        assert_eq!(config.min_profit_threshold, 0.005);
        assert_eq!(config.max_hops, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_ranges() {
        let bad = |f: fn(&mut Config)| {
            let mut c = Config::default();
            f(&mut c);
            c.validate().is_err()
        };
        assert!(bad(|c| c.min_profit_threshold = -0.1));
        assert!(bad(|c| c.max_hops = 1));
        assert!(bad(|c| c.max_hops = 7));
        assert!(bad(|c| c.max_slippage = 1.0));
        assert!(bad(|c| c.quote_ttl_secs = 0));
        assert!(bad(|c| c.max_quote_requests_per_sec = 0.0));
        assert!(bad(|c| c.max_concurrent_quotes = 0));
        assert!(bad(|c| c.execution_mode = ExecutionMode::Production));
    }

    #[test]
    fn test_risk_shape_and_limits_bounded() {
        let bad = |f: fn(&mut Config)| {
            let mut c = Config::default();
            f(&mut c);
            c.validate().is_err()
        };
        assert!(bad(|c| c.hop_decay = -0.9));
        assert!(bad(|c| c.hop_decay = 0.0));
        assert!(bad(|c| c.hop_decay = 1.5));
        assert!(bad(|c| c.hop_decay = f64::NAN));
        assert!(bad(|c| c.liquidity_multiple = 0.0));
        assert!(bad(|c| c.liquidity_multiple = f64::INFINITY));
        assert!(bad(|c| c.max_quote_requests_per_sec = f64::INFINITY));
        assert!(bad(|c| c.quote_ttl_secs = u64::MAX));
        assert!(bad(|c| c.base_amount = f64::INFINITY));

        let mut edge = Config::default();
        edge.hop_decay = 1.0;
        edge.quote_ttl_secs = MAX_QUOTE_TTL_SECS;
        assert!(edge.validate().is_ok());
    }

    #[test]
    fn test_quote_ttl_never_overflows() {
        let mut config = Config::default();
        config.quote_ttl_secs = u64::MAX;
        assert_eq!(config.quote_ttl(), chrono::Duration::seconds(MAX_QUOTE_TTL_SECS as i64));
    }

    #[test]
    fn test_production_with_relay() {
        let mut config = Config::default();
        config.execution_mode = ExecutionMode::Production;
        config.relay_url = Some("http://127.0.0.1:9000".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml_uses_defaults_for_missing_keys() {
        let config: Config = toml::from_str(
            r#"
            min_profit_threshold = 0.01
            max_hops = 3
            execution_mode = "DryRun"
            base_tokens = ["USDC"]
            "#,
        )
        .unwrap();
        assert_eq!(config.min_profit_threshold, 0.01);
        assert_eq!(config.max_hops, 3);
        assert_eq!(config.execution_mode, ExecutionMode::DryRun);
        assert_eq!(config.base_amount, 10.0);
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("dry_run".parse::<ExecutionMode>().unwrap(), ExecutionMode::DryRun);
        assert_eq!("PRODUCTION".parse::<ExecutionMode>().unwrap(), ExecutionMode::Production);
        assert!("yolo".parse::<ExecutionMode>().is_err());
    }

    #[test]
    fn test_derived_settings() {
        let usdc = Address::repeat_byte(0xaa);
        let book = TokenBook::new(vec![Token {
            address: usdc,
            symbol: "USDC".to_string(),
            decimals: 6,
        }]);
        let mut config = Config::default();
        config.base_tokens = vec!["USDC".to_string(), "NOPE".to_string()];
        config.enable_risk_evaluation = false;

        assert_eq!(config.detection_settings(&book).base_tokens, vec![usdc]);
        assert_eq!(config.scan_params().min_confidence, None);
        assert_eq!(config.risk_params().quote_ttl, chrono::Duration::seconds(30));
        assert_eq!(config.retry_policy().confirm_attempts, 10);
    }
}

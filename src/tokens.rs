//! Token universe for the scanner
//!
//! Tokens are loaded from a JSON token cache. Refreshing the universe just
//! reloads that cache; the book is only used for symbols, decimals and
//! enumerating candidate pairs for the live feed.

use alloy_primitives::Address;
use eyre::{Result, WrapErr};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Represents a token we're tracking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub address: Address,
    pub symbol: String,
    pub decimals: u8,
}

/// All known tokens, ordered by address
#[derive(Debug, Clone, Default)]
pub struct TokenBook {
    tokens: BTreeMap<Address, Token>,
}

impl TokenBook {
    pub fn new(tokens: Vec<Token>) -> Self {
        let mut book = Self::default();
        for token in tokens {
            if let Some(previous) = book.tokens.insert(token.address, token) {
                warn!("Duplicate token entry for {} replaced", previous.symbol);
            }
        }
        book
    }

    /// Load the token cache from disk
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .wrap_err_with(|| format!("reading token cache {}", path.display()))?;
        let tokens: Vec<Token> = serde_json::from_str(&content)
            .wrap_err_with(|| format!("parsing token cache {}", path.display()))?;

        let book = Self::new(tokens);
        info!("Loaded {} tokens from {}", book.len(), path.display());
        Ok(book)
    }

    /// Reload from disk, keeping the current book if the cache is unreadable
    pub fn refresh<P: AsRef<Path>>(&mut self, path: P) -> Result<usize> {
        let fresh = Self::load(path)?;
        self.tokens = fresh.tokens;
        Ok(self.tokens.len())
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn get(&self, address: &Address) -> Option<&Token> {
        self.tokens.get(address)
    }

    pub fn addresses(&self) -> Vec<Address> {
        self.tokens.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Token> {
        self.tokens.values()
    }

    /// Resolve a symbol (case-insensitive) to its address
    pub fn find_symbol(&self, symbol: &str) -> Option<Address> {
        self.tokens
            .values()
            .find(|t| t.symbol.eq_ignore_ascii_case(symbol))
            .map(|t| t.address)
    }

    /// Every ordered pair of distinct tokens
    pub fn ordered_pairs(&self) -> Vec<(Address, Address)> {
        let addresses = self.addresses();
        let mut pairs = Vec::with_capacity(addresses.len() * addresses.len().saturating_sub(1));
        for &from in &addresses {
            for &to in &addresses {
                if from != to {
                    pairs.push((from, to));
                }
            }
        }
        pairs
    }

    /// Symbol if known, otherwise a shortened address
    pub fn format_token(&self, address: &Address) -> String {
        match self.tokens.get(address) {
            Some(token) => token.symbol.clone(),
            None => format!("0x{}...", &format!("{:?}", address)[2..8]),
        }
    }

    pub fn format_path(&self, path: &[Address]) -> String {
        path.iter()
            .map(|a| self.format_token(a))
            .collect::<Vec<_>>()
            .join(" → ")
    }
}

/// Parse a token reference that is either an address or a known symbol
pub fn resolve_token(book: &TokenBook, reference: &str) -> Option<Address> {
    reference
        .parse::<Address>()
        .ok()
        .or_else(|| book.find_symbol(reference))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_book() -> TokenBook {
        TokenBook::new(vec![
            Token { address: Address::repeat_byte(2), symbol: "USDC".into(), decimals: 6 },
            Token { address: Address::repeat_byte(1), symbol: "SOL".into(), decimals: 9 },
        ])
    }

    #[test]
    fn test_book_is_ordered_by_address() {
        let book = sample_book();
        assert_eq!(book.addresses(), vec![Address::repeat_byte(1), Address::repeat_byte(2)]);
    }

    #[test]
    fn test_format_unknown_token() {
        let book = sample_book();
        assert_eq!(book.format_token(&Address::repeat_byte(1)), "SOL");
        assert_eq!(book.format_token(&Address::repeat_byte(0xab)), "0xababab...");
    }

    #[test]
    fn test_ordered_pairs() {
        let book = sample_book();
        let pairs = book.ordered_pairs();
        assert_eq!(pairs.len(), 2);
        assert!(pairs.iter().all(|(a, b)| a != b));
    }

    #[test]
    fn test_resolve_by_symbol_or_address() {
        let book = sample_book();
        assert_eq!(resolve_token(&book, "usdc"), Some(Address::repeat_byte(2)));
        let raw = format!("{:?}", Address::repeat_byte(7));
        assert_eq!(resolve_token(&book, &raw), Some(Address::repeat_byte(7)));
        assert_eq!(resolve_token(&book, "DOGE"), None);
    }

    #[test]
    fn test_load_token_cache() {
        let dir = std::env::temp_dir().join(format!("cycle-sniper-tokens-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("tokens.json");
        fs::write(
            &path,
            r#"[{"address":"0x0101010101010101010101010101010101010101","symbol":"SOL","decimals":9}]"#,
        )
        .unwrap();

        let mut book = TokenBook::default();
        assert_eq!(book.refresh(&path).unwrap(), 1);
        assert_eq!(book.get(&Address::repeat_byte(1)).unwrap().decimals, 9);
        fs::remove_dir_all(&dir).ok();
    }
}

//! Wallet list payload submitted for analysis
//!
//! The backend reads a CSV with a `wallet_address` column and an optional
//! `blockchain` column. Addresses are EVM-style (`0x` + 40 hex characters).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{AnalysisError, Result};

/// Maximum number of wallets accepted per analysis
pub const MAX_WALLETS: usize = 100;

/// Maximum size of the uploaded CSV in bytes
pub const MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

/// Supported chains
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Blockchain {
    #[default]
    Ethereum,
    Bsc,
    Polygon,
}

impl Blockchain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Blockchain::Ethereum => "ethereum",
            Blockchain::Bsc => "bsc",
            Blockchain::Polygon => "polygon",
        }
    }
}

impl fmt::Display for Blockchain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Blockchain {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ethereum" => Ok(Blockchain::Ethereum),
            "bsc" => Ok(Blockchain::Bsc),
            "polygon" => Ok(Blockchain::Polygon),
            other => Err(AnalysisError::InvalidWalletList(format!(
                "unsupported blockchain '{}' (expected one of: ethereum, bsc, polygon)",
                other
            ))),
        }
    }
}

/// A validated, lower-cased wallet address on a given chain
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WalletEntry {
    address: String,
    blockchain: Blockchain,
}

impl WalletEntry {
    pub fn new(address: &str, blockchain: Blockchain) -> Result<Self> {
        let address = address.trim();
        if !is_wallet_address(address) {
            return Err(AnalysisError::InvalidWalletList(format!(
                "invalid wallet address: {}",
                address
            )));
        }
        Ok(Self {
            address: address.to_ascii_lowercase(),
            blockchain,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn blockchain(&self) -> Blockchain {
        self.blockchain
    }
}

impl FromStr for WalletEntry {
    type Err = AnalysisError;

    /// Parse `<address>`, `<address>,<chain>` or `<address>:<chain>`
    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.splitn(2, &[',', ':'][..]);
        let address = parts.next().unwrap_or_default();
        let blockchain = match parts.next().map(str::trim).filter(|c| !c.is_empty()) {
            Some(chain) => chain.parse()?,
            None => Blockchain::default(),
        };
        WalletEntry::new(address, blockchain)
    }
}

/// Non-empty, bounded list of wallets for one analysis job
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WalletList {
    entries: Vec<WalletEntry>,
}

impl WalletList {
    pub fn new(entries: Vec<WalletEntry>) -> Result<Self> {
        if entries.is_empty() {
            return Err(AnalysisError::InvalidWalletList(
                "at least one wallet address is required".into(),
            ));
        }
        if entries.len() > MAX_WALLETS {
            return Err(AnalysisError::InvalidWalletList(format!(
                "{} wallets exceeds the limit of {}",
                entries.len(),
                MAX_WALLETS
            )));
        }
        Ok(Self { entries })
    }

    /// Build a list of Ethereum wallets from bare addresses
    pub fn from_addresses<I, S>(addresses: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let entries = addresses
            .into_iter()
            .map(|a| WalletEntry::new(a.as_ref(), Blockchain::Ethereum))
            .collect::<Result<Vec<_>>>()?;
        Self::new(entries)
    }

    /// Parse one wallet per line; blank lines, `#` comments and a
    /// `wallet_address` header are skipped
    pub fn parse_lines(input: &str) -> Result<Self> {
        let entries = input
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter(|line| !line.to_ascii_lowercase().starts_with("wallet_address"))
            .map(str::parse)
            .collect::<Result<Vec<_>>>()?;
        Self::new(entries)
    }

    pub fn entries(&self) -> &[WalletEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render the CSV upload body
    pub fn to_csv(&self) -> Result<Vec<u8>> {
        let mut csv = String::from("wallet_address,blockchain\n");
        for entry in &self.entries {
            csv.push_str(&entry.address);
            csv.push(',');
            csv.push_str(entry.blockchain.as_str());
            csv.push('\n');
        }
        if csv.len() > MAX_UPLOAD_BYTES {
            return Err(AnalysisError::InvalidWalletList(format!(
                "upload is {} bytes, limit is {}",
                csv.len(),
                MAX_UPLOAD_BYTES
            )));
        }
        Ok(csv.into_bytes())
    }
}

/// `0x` followed by exactly 40 hex digits
pub fn is_wallet_address(address: &str) -> bool {
    address.len() == 42
        && address.starts_with("0x")
        && address[2..].bytes().all(|b| b.is_ascii_hexdigit())
}

/// Shorten an address for display, e.g. `0x1234...abcd`
pub fn short_address(address: &str) -> String {
    const MAX_LEN: usize = 12;
    if address.chars().count() <= MAX_LEN {
        return address.to_string();
    }
    let head: String = address.chars().take(6).collect();
    let tail: String = address
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("{}...{}", head, tail)
}

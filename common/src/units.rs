//! Asset codes and integer amount units.
//!
//! Every balance counts indivisible base units of one asset. The asset's
//! `scale` says how many decimal places one whole unit carries, so `1050`
//! base units of a scale-2 asset represent `10.50`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Ledger amount in base units of an asset.
pub type Amount = u64;

/// Largest asset scale accepted by the registry.
/// Scale 18 already exhausts most of the u64 range for a single whole unit.
pub const MAX_ASSET_SCALE: u8 = 18;

/// Longest accepted asset code.
pub const MAX_ASSET_CODE_LEN: usize = 8;

/// An asset code such as `USD`, `EUR`, or `XRP`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetCode(String);

impl AssetCode {
    /// Create a new asset code.
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Get the code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Validate the asset code format.
    pub fn is_valid(&self) -> bool {
        // Non-empty, bounded, uppercase alphanumeric
        !self.0.is_empty()
            && self.0.len() <= MAX_ASSET_CODE_LEN
            && self
                .0
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
    }
}

impl fmt::Display for AssetCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AssetCode {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for AssetCode {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Base units in one whole unit of an asset with the given scale,
/// or `None` when the scale is out of range.
pub fn scale_factor(scale: u8) -> Option<Amount> {
    if scale > MAX_ASSET_SCALE {
        return None;
    }
    10u64.checked_pow(scale as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_code_validation() {
        assert!(AssetCode::new("USD").is_valid());
        assert!(AssetCode::new("XRP").is_valid());
        assert!(AssetCode::new("USDC2").is_valid());
        assert!(!AssetCode::new("").is_valid());
        assert!(!AssetCode::new("usd").is_valid());
        assert!(!AssetCode::new("US-DOLLAR").is_valid());
        assert!(!AssetCode::new("VERYLONGCODE").is_valid());
    }

    #[test]
    fn test_scale_factor() {
        assert_eq!(scale_factor(0), Some(1));
        assert_eq!(scale_factor(2), Some(100));
        assert_eq!(scale_factor(9), Some(1_000_000_000));
        assert_eq!(scale_factor(19), None);
    }
}

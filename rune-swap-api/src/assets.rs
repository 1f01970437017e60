//! Asset types for the two sides of a trade
use serde::{Deserialize, Serialize};

/// One side of a trade: the base asset (BTC) or a fungible Rune token
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    /// The stable identifier of the asset
    pub id: String,
    /// The display name of the asset
    pub name: String,
    /// An optional icon reference for the asset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// Whether this asset is the native base asset (BTC)
    pub is_base_asset: bool,
    /// The number of decimal places in the asset's base-unit representation
    pub decimals: u8,
}

impl Asset {
    /// Construct the native base asset (BTC, 8 decimals)
    pub fn base(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            icon: None,
            is_base_asset: true,
            decimals: 8,
        }
    }

    /// Construct a Rune token asset
    pub fn rune(id: &str, name: &str, decimals: u8) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            icon: None,
            is_base_asset: false,
            decimals,
        }
    }
}

/// Whether two assets form a valid trading pair
///
/// A pair is valid iff exactly one of its sides is the base asset; two
/// base assets or two tokens never trade against each other.
pub fn is_valid_pair(asset_in: &Asset, asset_out: &Asset) -> bool {
    asset_in.is_base_asset != asset_out.is_base_asset
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test that a pair is valid only when exactly one side is the base asset
    #[test]
    fn test_pair_validity() {
        let btc = Asset::base("btc", "Bitcoin");
        let rune = Asset::rune("840000:3", "DOG•GO•TO•THE•MOON", 5);

        assert!(is_valid_pair(&btc, &rune));
        assert!(is_valid_pair(&rune, &btc));
        assert!(!is_valid_pair(&btc, &btc.clone()));
        assert!(!is_valid_pair(&rune, &rune.clone()));
    }
}

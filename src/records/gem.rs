//! Gem-of-the-week portfolio entries.

use crate::store::{OptimisticStore, StoreConfig};
use crate::types::{ById, Identified, Patch};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Gem {
    pub id: String,
    pub name: String,
    /// CoinGecko API name of the coin.
    pub coingecko_id: String,
    pub current_value: f64,
    pub value_when_added: f64,
    pub value_when_sold: Option<f64>,
}

impl Identified for Gem {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Gem {
    pub fn is_sold(&self) -> bool {
        self.value_when_sold.is_some()
    }

    /// Percent change since the gem was added, measured at the sale value
    /// once sold. `None` if the added value is zero.
    pub fn gain_percent(&self) -> Option<f64> {
        if self.value_when_added == 0.0 {
            return None;
        }
        let value = self.value_when_sold.unwrap_or(self.current_value);
        Some((value - self.value_when_added) / self.value_when_added * 100.0)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct GemPatch {
    pub name: Option<String>,
    pub coingecko_id: Option<String>,
    pub current_value: Option<f64>,
    pub value_when_added: Option<f64>,
    pub value_when_sold: Option<Option<f64>>,
}

impl GemPatch {
    pub fn sold_at(value: f64) -> Self {
        Self {
            value_when_sold: Some(Some(value)),
            ..Default::default()
        }
    }
}

impl Patch<Gem> for GemPatch {
    fn apply_to(&self, record: &mut Gem) {
        if let Some(name) = &self.name {
            record.name = name.clone();
        }
        if let Some(coingecko_id) = &self.coingecko_id {
            record.coingecko_id = coingecko_id.clone();
        }
        if let Some(value) = self.current_value {
            record.current_value = value;
        }
        if let Some(value) = self.value_when_added {
            record.value_when_added = value;
        }
        if let Some(value) = self.value_when_sold {
            record.value_when_sold = value;
        }
    }
}

/// A store of gems keyed by `id`.
pub fn gem_store() -> OptimisticStore<Gem> {
    OptimisticStore::with_config(ById, StoreConfig::named("gems"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn waffle() -> Gem {
        Gem {
            id: "gem_1".into(),
            name: "WaffleCoin".into(),
            coingecko_id: "wafflecoin".into(),
            current_value: 250.0,
            value_when_added: 200.0,
            value_when_sold: None,
        }
    }

    #[test]
    fn test_gain_percent() {
        let mut gem = waffle();
        assert_eq!(gem.gain_percent(), Some(25.0));

        GemPatch::sold_at(300.0).apply_to(&mut gem);
        assert!(gem.is_sold());
        assert_eq!(gem.gain_percent(), Some(50.0));

        gem.value_when_added = 0.0;
        assert_eq!(gem.gain_percent(), None);
    }

    #[test]
    fn test_serde_field_names() {
        let value = serde_json::to_value(waffle()).unwrap();
        assert_eq!(value["coingeckoId"], "wafflecoin");
        assert_eq!(value["valueWhenSold"], serde_json::Value::Null);
    }
}

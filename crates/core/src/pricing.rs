use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_CURRENCY: &str = "USD";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub amount: Decimal,
    pub currency: String,
}

impl Quote {
    /// Display form used in the quote email, e.g. `$89.00`.
    pub fn formatted(&self) -> String {
        let symbol = match self.currency.as_str() {
            "USD" => "$",
            "EUR" => "€",
            other => other,
        };
        format!("{symbol}{:.2}", self.amount)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PricingError {
    #[error("no price table for service type `{0}`")]
    UnknownServiceType(String),
    #[error("no price for bedroom tier `{bedroom_tier}` in service type `{service_type}`")]
    UnknownBedroomTier { service_type: String, bedroom_tier: String },
    #[error("price for `{service_type}.{bedroom_tier}` must not be negative")]
    NegativeAmount { service_type: String, bedroom_tier: String },
}

/// Static `service type -> bedroom tier -> amount` lookup.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceTable {
    currency: Option<String>,
    services: BTreeMap<String, BTreeMap<String, Decimal>>,
}

impl PriceTable {
    pub fn new(currency: Option<String>) -> Self {
        Self { currency, services: BTreeMap::new() }
    }

    pub fn with_price(
        mut self,
        service_type: impl Into<String>,
        bedroom_tier: impl Into<String>,
        amount: Decimal,
    ) -> Self {
        self.set_price(service_type, bedroom_tier, amount);
        self
    }

    pub fn set_price(
        &mut self,
        service_type: impl Into<String>,
        bedroom_tier: impl Into<String>,
        amount: Decimal,
    ) {
        self.services.entry(service_type.into()).or_default().insert(bedroom_tier.into(), amount);
    }

    pub fn set_currency(&mut self, currency: impl Into<String>) {
        self.currency = Some(currency.into());
    }

    pub fn currency(&self) -> &str {
        self.currency.as_deref().unwrap_or(DEFAULT_CURRENCY)
    }

    pub fn quote(&self, service_type: &str, bedroom_tier: &str) -> Result<Quote, PricingError> {
        let tiers = self
            .services
            .get(service_type)
            .ok_or_else(|| PricingError::UnknownServiceType(service_type.to_string()))?;
        let amount = tiers.get(bedroom_tier).copied().ok_or_else(|| {
            PricingError::UnknownBedroomTier {
                service_type: service_type.to_string(),
                bedroom_tier: bedroom_tier.to_string(),
            }
        })?;

        Ok(Quote { amount, currency: self.currency().to_string() })
    }

    pub fn validate(&self) -> Result<(), PricingError> {
        for (service_type, tiers) in &self.services {
            for (bedroom_tier, amount) in tiers {
                if *amount < Decimal::ZERO {
                    return Err(PricingError::NegativeAmount {
                        service_type: service_type.clone(),
                        bedroom_tier: bedroom_tier.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

impl Default for PriceTable {
    fn default() -> Self {
        let standard =
            [("studio", 8_900), ("1br", 10_900), ("2br", 12_900), ("3br", 15_900), ("4br", 18_900)];
        let deep =
            [("studio", 13_900), ("1br", 16_900), ("2br", 19_900), ("3br", 23_900), ("4br", 27_900)];

        let mut table = Self::new(Some(DEFAULT_CURRENCY.to_string()));
        for (tier, cents) in standard {
            table.set_price("standard", tier, Decimal::new(cents, 2));
        }
        for (tier, cents) in deep {
            table.set_price("deep", tier, Decimal::new(cents, 2));
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{PriceTable, PricingError, Quote};

    #[test]
    fn quote_is_deterministic_for_same_inputs() {
        let table = PriceTable::default();

        let first = table.quote("standard", "studio").expect("standard studio is priced");
        let second = table.quote("standard", "studio").expect("standard studio is priced");

        assert_eq!(first, second);
        assert_eq!(first.amount, Decimal::new(8_900, 2));
        assert_eq!(first.currency, "USD");
    }

    #[test]
    fn unknown_service_type_is_rejected() {
        let error = PriceTable::default()
            .quote("invalid_type", "studio")
            .expect_err("unknown service type must fail");

        assert_eq!(error, PricingError::UnknownServiceType("invalid_type".to_string()));
    }

    #[test]
    fn unknown_bedroom_tier_is_rejected() {
        let table = PriceTable::new(None).with_price("deep", "studio", Decimal::new(13_900, 2));
        let error = table.quote("deep", "4br").expect_err("missing tier must fail");

        assert!(matches!(error, PricingError::UnknownBedroomTier { .. }));
    }

    #[test]
    fn currency_defaults_to_usd_when_table_has_none() {
        let table = PriceTable::new(None).with_price("standard", "studio", Decimal::new(5_000, 2));
        let quote = table.quote("standard", "studio").expect("priced");

        assert_eq!(quote.currency, "USD");
    }

    #[test]
    fn negative_prices_fail_validation() {
        let table = PriceTable::default().with_price("standard", "2br", Decimal::new(-100, 2));
        assert!(matches!(table.validate(), Err(PricingError::NegativeAmount { .. })));
        assert!(PriceTable::default().validate().is_ok());
    }

    #[test]
    fn formatted_amount_uses_currency_symbol_and_two_decimals() {
        let usd = Quote { amount: Decimal::new(89, 0), currency: "USD".to_string() };
        let eur = Quote { amount: Decimal::new(1_095, 1), currency: "EUR".to_string() };
        let chf = Quote { amount: Decimal::new(12_050, 2), currency: "CHF".to_string() };

        assert_eq!(usd.formatted(), "$89.00");
        assert_eq!(eur.formatted(), "€109.50");
        assert_eq!(chf.formatted(), "CHF120.50");
    }
}

use rust_decimal::{Decimal, RoundingStrategy};

/// Number of decimal places every stored monetary amount is rounded to
pub const MONEY_SCALE: u32 = 2;

/// Decimal arithmetic helpers shared by the pricing and settlement code
pub struct PriceCalculator;

impl PriceCalculator {
    /// Round an amount to the currency scale (midpoint away from zero)
    pub fn round(amount: Decimal) -> Decimal {
        amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
    }

    /// Calculate `percent`% of `amount`, rounded to the currency scale
    ///
    /// # Arguments
    /// * `amount` - Amount the percentage is taken from
    /// * `percent` - Percentage expressed as a whole value (10 = 10%)
    pub fn percent_of(amount: Decimal, percent: Decimal) -> Decimal {
        Self::round(amount * percent / Decimal::ONE_HUNDRED)
    }

    /// Calculate the stay subtotal from the per-night rates
    pub fn calculate_subtotal(nightly_rates: &[Decimal]) -> Decimal {
        nightly_rates.iter().sum()
    }

    /// Sum already-rounded line items into a total
    pub fn calculate_total(lines: &[Decimal]) -> Decimal {
        lines.iter().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_round_midpoint_away_from_zero() {
        assert_eq!(PriceCalculator::round(dec!(17.505)), dec!(17.51));
        assert_eq!(PriceCalculator::round(dec!(17.504)), dec!(17.50));
        assert_eq!(PriceCalculator::round(dec!(0.005)), dec!(0.01));
    }

    #[test]
    fn test_percent_of_basic() {
        assert_eq!(PriceCalculator::percent_of(dec!(300), dec!(10)), dec!(30));
        assert_eq!(PriceCalculator::percent_of(dec!(350), dec!(5)), dec!(17.50));
    }

    #[test]
    fn test_percent_of_rounds_to_cents() {
        assert_eq!(PriceCalculator::percent_of(dec!(99.99), dec!(12.5)), dec!(12.50));
        assert_eq!(PriceCalculator::percent_of(dec!(0.03), dec!(50)), dec!(0.02));
    }

    #[test]
    fn test_calculate_subtotal_nightly() {
        let rates = vec![dec!(100), dec!(120), dec!(120)];
        assert_eq!(PriceCalculator::calculate_subtotal(&rates), dec!(340));
    }

    #[test]
    fn test_calculate_subtotal_empty() {
        let rates: Vec<Decimal> = vec![];
        assert_eq!(PriceCalculator::calculate_subtotal(&rates), dec!(0));
    }

    #[test]
    fn test_calculate_total_lines() {
        let lines = vec![dec!(300), dec!(20), dec!(30), dec!(17.50)];
        assert_eq!(PriceCalculator::calculate_total(&lines), dec!(367.50));
    }
}

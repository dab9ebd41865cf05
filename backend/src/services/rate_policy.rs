//! Interest rate assignment at approval time

use rand::Rng;
use rust_decimal::Decimal;

/// Picks the interest rate (percent, two decimals) for a loan being approved
pub trait RatePolicy: Send + Sync {
    fn assign_rate(&self) -> Decimal;
}

/// Uniform draw over `[min, max]` at cent precision
#[derive(Debug, Clone)]
pub struct UniformRatePolicy {
    min_cents: i64,
    max_cents: i64,
}

impl UniformRatePolicy {
    /// `min` and `max` are truncated to two decimals; callers guarantee `min <= max`
    pub fn new(min: Decimal, max: Decimal) -> Self {
        Self {
            min_cents: to_cents(min),
            max_cents: to_cents(max),
        }
    }
}

impl Default for UniformRatePolicy {
    fn default() -> Self {
        Self {
            min_cents: 300,
            max_cents: 1000,
        }
    }
}

fn to_cents(rate: Decimal) -> i64 {
    let cents = (rate * Decimal::ONE_HUNDRED).trunc();
    i64::try_from(cents).unwrap_or(0)
}

impl RatePolicy for UniformRatePolicy {
    fn assign_rate(&self) -> Decimal {
        let cents = rand::thread_rng().gen_range(self.min_cents..=self.max_cents);
        Decimal::new(cents, 2)
    }
}

/// Always returns the same rate
#[derive(Debug, Clone)]
pub struct FixedRatePolicy(pub Decimal);

impl RatePolicy for FixedRatePolicy {
    fn assign_rate(&self) -> Decimal {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_uniform_rates_stay_in_range() {
        let policy = UniformRatePolicy::default();
        for _ in 0..500 {
            let rate = policy.assign_rate();
            assert!(rate >= dec!(3.00) && rate <= dec!(10.00), "rate {}", rate);
            assert!(rate.scale() <= 2);
        }
    }

    #[test]
    fn test_degenerate_range() {
        let policy = UniformRatePolicy::new(dec!(7.5), dec!(7.5));
        assert_eq!(policy.assign_rate(), dec!(7.50));
    }

    #[test]
    fn test_fixed_policy() {
        assert_eq!(FixedRatePolicy(dec!(4.25)).assign_rate(), dec!(4.25));
    }
}

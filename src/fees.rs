//! Fee resolution: merchant-scoped override with a platform-default fallback.
//!
//! Pure lookup over the per-request fee snapshot; no caching, no side
//! effects.

use rust_decimal::Decimal;

use crate::config::FeeConfig;
use crate::types::FeeSchedule;

/// Resolves the fee schedule for a merchant.
///
/// A row whose `merchant_id` matches wins; otherwise the single row flagged
/// `is_default` applies. When the config carries neither, the gateway takes
/// no cut.
pub fn resolve_fee(fees: &[FeeConfig], merchant_id: Option<&str>) -> FeeSchedule {
    if let Some(merchant_id) = merchant_id {
        if let Some(fee) = fees
            .iter()
            .find(|fee| fee.merchant_id.as_deref() == Some(merchant_id))
        {
            return fee.schedule();
        }
    }
    fees.iter()
        .find(|fee| fee.is_default)
        .map(FeeConfig::schedule)
        .unwrap_or(FeeSchedule {
            percentage: Decimal::ZERO,
            fixed: Decimal::ZERO,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn fee(merchant_id: Option<&str>, percentage: Decimal, is_default: bool) -> FeeConfig {
        FeeConfig {
            merchant_id: merchant_id.map(str::to_string),
            percentage,
            fixed: dec!(0.40),
            is_default,
        }
    }

    #[test]
    fn test_merchant_override_wins_over_default() {
        let fees = vec![
            fee(None, dec!(5.99), true),
            fee(Some("m-1"), dec!(3.49), false),
        ];
        assert_eq!(resolve_fee(&fees, Some("m-1")).percentage, dec!(3.49));
        assert_eq!(resolve_fee(&fees, Some("m-2")).percentage, dec!(5.99));
        assert_eq!(resolve_fee(&fees, None).percentage, dec!(5.99));
    }

    #[test]
    fn test_empty_table_takes_no_cut() {
        let schedule = resolve_fee(&[], Some("m-1"));
        assert_eq!(schedule.percentage, Decimal::ZERO);
        assert_eq!(schedule.fixed, Decimal::ZERO);
    }
}

use rust_decimal::{Decimal, RoundingStrategy};

/// Whole-rupiah rounding for display. Core arithmetic keeps full precision.
pub fn round_rupiah(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
}

pub fn round_currency(value: Decimal, dp: u32) -> Decimal {
    value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero)
}

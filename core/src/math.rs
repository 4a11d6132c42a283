use alloy::primitives::U256;

/// floor(balance * pct / 100). Truncating division only: round-off always
/// reduces the amount delivered, never inflates it.
pub fn percentage_of(balance: U256, pct: u32) -> Option<U256> {
    balance.checked_mul(U256::from(pct)).map(|v| v / U256::from(100u8))
}

/// floor(amount * (100 - pct) / 100). `pct` over 100 is rejected.
pub fn apply_slippage(amount: U256, pct: u32) -> Option<U256> {
    let keep = 100u32.checked_sub(pct)?;
    amount.checked_mul(U256::from(keep)).map(|v| v / U256::from(100u8))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentage_floors_toward_zero() {
        // 50% of 7 is 3, never 3.5 or 4.
        assert_eq!(percentage_of(U256::from(7u8), 50), Some(U256::from(3u8)));
        assert_eq!(percentage_of(U256::from(0u8), 50), Some(U256::ZERO));
        assert_eq!(percentage_of(U256::from(100u8), 100), Some(U256::from(100u8)));
        assert_eq!(percentage_of(U256::from(1u8), 99), Some(U256::ZERO));
    }

    #[test]
    fn percentage_overflow_is_detected() {
        assert_eq!(percentage_of(U256::MAX, 2), None);
    }

    #[test]
    fn slippage_floors_toward_zero() {
        assert_eq!(apply_slippage(U256::from(1000u16), 5), Some(U256::from(950u16)));
        assert_eq!(apply_slippage(U256::from(7u8), 50), Some(U256::from(3u8)));
        assert_eq!(apply_slippage(U256::from(1000u16), 0), Some(U256::from(1000u16)));
        assert_eq!(apply_slippage(U256::from(1000u16), 100), Some(U256::ZERO));
    }

    #[test]
    fn slippage_over_100_is_rejected() {
        assert_eq!(apply_slippage(U256::from(1000u16), 101), None);
    }
}

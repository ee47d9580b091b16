//! Fixed-point tick math for a Uniswap-v3-family concentrated liquidity pool.
//!
//! Integer arithmetic here mirrors the on-chain contract math bit-for-bit:
//! `U256` carries the Q64.96 sqrt-price ratios, `U512` absorbs the
//! intermediate products `amountsForLiquidity` needs before its final
//! division. Everything outside this module works in plain `f64` prices;
//! this is the only place the crate does exact integer math.

use primitive_types::{U256, U512};
use thiserror::Error;

pub const MIN_TICK: i32 = -887272;
pub const MAX_TICK: i32 = 887272;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClMathError {
    #[error("tick {0} outside the valid range [{MIN_TICK}, {MAX_TICK}]")]
    TickOutOfRange(i32),

    #[error("sqrtPrice overflow for tick {0}")]
    Overflow(i32),
}

fn q96() -> U256 {
    U256::one() << 96
}

/// The 20-constant prefactor table from the canonical tick-math
/// implementation, each a 128-bit magic number tested against one bit of
/// `|tick|`. Stored as `u128` literals since every entry fits exactly.
const PREFACTORS: [u128; 20] = [
    0xfffcb933bd6fad37aa2d162d1a594001,
    0xfff97272373d413259a46990580e213a,
    0xfff2e50f5f656932ef12357cf3c7fdcc,
    0xffe5caca7e10e4e61c3624eaa0941cd0,
    0xffcb9843d60f6159c9db58835c926644,
    0xff973b41fa98c081472e6896dfb254c0,
    0xff2ea16466c96a3843ec78b326b52861,
    0xfe5dee046a99a2a811c461f1969c3053,
    0xfcbe86c7900a88aedcffc83b479aa3a4,
    0xf987a7253ac413176f2b074cf7815e54,
    0xf3392b0822b70005940c7a398e4b70f3,
    0xe7159475a2c29b7443b29c7fa6e889d9,
    0xd097f3bdfd2022b8845ad8f792aa5825,
    0xa9f746462d870fdf8a65dc1f90e061e5,
    0x70d869a156d2a1b890bb3df62baf32f7,
    0x31be135f97d08fd981231505542fcfa6,
    0x09aa508b5b7a84e1c677de54f3e99bc9,
    0x005d6af8dedb81196699c329225ee604,
    0x0002216e584f5fa1ea926041bedfe98,
    0x0000048a170391f7dc42444e8fa2,
];

/// Tick → √price in Q64.96 fixed point. Ported from the prefactor-table
/// walk every Uniswap-v3-family pool uses: start from the two lowest bits'
/// base ratio, fold in one 128-bit magic number per set bit of `|tick|`,
/// invert for positive ticks, then shift Q128.128 down to Q64.96 with
/// round-up on any truncated bit.
pub fn sqrt_ratio_at_tick(tick: i32) -> Result<U256, ClMathError> {
    let abs_tick = tick.unsigned_abs();
    if abs_tick > MAX_TICK as u32 {
        return Err(ClMathError::TickOutOfRange(tick));
    }

    let mut ratio: U256 = if abs_tick & 0x1 != 0 {
        U256::from(PREFACTORS[0])
    } else {
        U256::one() << 128
    };

    for (i, prefactor) in PREFACTORS.iter().enumerate().skip(1) {
        let bit = 1u32 << i;
        if abs_tick & bit != 0 {
            ratio = (ratio * U256::from(*prefactor)) >> 128;
        }
    }

    if tick > 0 {
        ratio = U256::max_value() / ratio;
    }

    let shifted = ratio >> 32;
    let remainder = ratio - (shifted << 32);
    let sqrt_price_x96 = if remainder.is_zero() { shifted } else { shifted + U256::one() };

    let max_sqrt_price = (U256::one() << 160) - U256::one();
    if sqrt_price_x96 > max_sqrt_price {
        return Err(ClMathError::Overflow(tick));
    }

    Ok(sqrt_price_x96)
}

fn order_pair(a: U256, b: U256) -> (U256, U256) {
    if a > b { (b, a) } else { (a, b) }
}

/// `mulDiv(a, b, denominator)` via a 512-bit intermediate product, avoiding
/// the overflow a plain `a * b / denominator` would hit once `a * b`
/// exceeds 256 bits.
fn mul_div(a: U256, b: U256, denominator: U256) -> U256 {
    let product = U512::from(a) * U512::from(b);
    let result = product / U512::from(denominator);
    u512_to_u256(result)
}

/// Truncate a `U512` known to fit in 256 bits down to `U256`, reading the
/// low four 64-bit limbs directly.
fn u512_to_u256(v: U512) -> U256 {
    let limbs = v.0;
    U256([limbs[0], limbs[1], limbs[2], limbs[3]])
}

fn amount0_for_liquidity(sqrt_a: U256, sqrt_b: U256, liquidity: U256) -> U256 {
    let (sqrt_a, sqrt_b) = order_pair(sqrt_a, sqrt_b);
    if sqrt_a.is_zero() {
        return U256::zero();
    }
    let numerator1 = liquidity << 96;
    let numerator2 = sqrt_b - sqrt_a;
    mul_div(numerator1, numerator2, sqrt_b) / sqrt_a
}

fn amount1_for_liquidity(sqrt_a: U256, sqrt_b: U256, liquidity: U256) -> U256 {
    let (sqrt_a, sqrt_b) = order_pair(sqrt_a, sqrt_b);
    mul_div(liquidity, sqrt_b - sqrt_a, q96())
}

/// `(amount0, amount1)` held by liquidity `L` placed across `[sqrtA, sqrtB]`
/// at the current price `sqrtP`. Three regions: entirely below the band
/// (all token0), straddling it (both tokens), entirely above it (all token1).
pub fn amounts_for_liquidity(sqrt_p: U256, sqrt_a: U256, sqrt_b: U256, liquidity: U256) -> (U256, U256) {
    let (sqrt_a, sqrt_b) = order_pair(sqrt_a, sqrt_b);
    if sqrt_p <= sqrt_a {
        (amount0_for_liquidity(sqrt_a, sqrt_b, liquidity), U256::zero())
    } else if sqrt_p < sqrt_b {
        (
            amount0_for_liquidity(sqrt_p, sqrt_b, liquidity),
            amount1_for_liquidity(sqrt_a, sqrt_p, liquidity),
        )
    } else {
        (U256::zero(), amount1_for_liquidity(sqrt_a, sqrt_b, liquidity))
    }
}

/// Floor-divide-and-align a tick to a pool's tick spacing, matching Python's
/// floor-toward-negative-infinity `%` rather than Rust's truncating one.
pub fn align_to_spacing(tick: i32, spacing: i32) -> i32 {
    let spacing = spacing.max(1);
    let rem = ((tick % spacing) + spacing) % spacing;
    tick - rem
}

/// Number of ticks spanning a percentage move from the current price,
/// aligned down to the pool's tick spacing. `price = 1.0001^tick`, so a
/// fractional move `pct` spans `ln(1+pct) / ln(1.0001)` ticks.
pub fn pct_to_ticks(pct: f64, tick_spacing: i32) -> i32 {
    if pct <= 0.0 {
        return 0;
    }
    let raw = (1.0 + pct).ln() / 1.0001_f64.ln();
    align_to_spacing(raw.round() as i32, tick_spacing)
}

/// Tick → human price, scaled by the pair's decimal difference.
pub fn tick_to_price(tick: i32, dec0: i32, dec1: i32) -> f64 {
    1.0001_f64.powi(tick) * 10f64.powi(dec0 - dec1)
}

/// Human price → nearest tick, inverse of [`tick_to_price`].
pub fn price_to_tick(price: f64, dec0: i32, dec1: i32) -> i32 {
    let unscaled = price / 10f64.powi(dec0 - dec1);
    (unscaled.ln() / 1.0001_f64.ln()).round() as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqrt_ratio_at_tick_zero_is_q96() {
        let ratio = sqrt_ratio_at_tick(0).unwrap();
        assert_eq!(ratio, q96());
    }

    #[test]
    fn sqrt_ratio_at_tick_rejects_out_of_range() {
        assert_eq!(sqrt_ratio_at_tick(MAX_TICK + 1), Err(ClMathError::TickOutOfRange(MAX_TICK + 1)));
    }

    #[test]
    fn sqrt_ratio_monotonic_in_tick() {
        let low = sqrt_ratio_at_tick(-100).unwrap();
        let mid = sqrt_ratio_at_tick(0).unwrap();
        let high = sqrt_ratio_at_tick(100).unwrap();
        assert!(low < mid);
        assert!(mid < high);
    }

    #[test]
    fn amounts_for_liquidity_below_band_is_all_token0() {
        let sqrt_a = sqrt_ratio_at_tick(100).unwrap();
        let sqrt_b = sqrt_ratio_at_tick(200).unwrap();
        let sqrt_p = sqrt_ratio_at_tick(0).unwrap();
        let (amt0, amt1) = amounts_for_liquidity(sqrt_p, sqrt_a, sqrt_b, U256::from(1_000_000_000u64));
        assert!(amt0 > U256::zero());
        assert_eq!(amt1, U256::zero());
    }

    #[test]
    fn amounts_for_liquidity_above_band_is_all_token1() {
        let sqrt_a = sqrt_ratio_at_tick(-200).unwrap();
        let sqrt_b = sqrt_ratio_at_tick(-100).unwrap();
        let sqrt_p = sqrt_ratio_at_tick(0).unwrap();
        let (amt0, amt1) = amounts_for_liquidity(sqrt_p, sqrt_a, sqrt_b, U256::from(1_000_000_000u64));
        assert_eq!(amt0, U256::zero());
        assert!(amt1 > U256::zero());
    }

    #[test]
    fn amounts_for_liquidity_inside_band_is_both_tokens() {
        let sqrt_a = sqrt_ratio_at_tick(-100).unwrap();
        let sqrt_b = sqrt_ratio_at_tick(100).unwrap();
        let sqrt_p = sqrt_ratio_at_tick(0).unwrap();
        let (amt0, amt1) = amounts_for_liquidity(sqrt_p, sqrt_a, sqrt_b, U256::from(1_000_000_000u64));
        assert!(amt0 > U256::zero());
        assert!(amt1 > U256::zero());
    }

    #[test]
    fn align_to_spacing_floors_toward_negative_infinity() {
        assert_eq!(align_to_spacing(7, 10), 0);
        assert_eq!(align_to_spacing(-7, 10), -10);
        assert_eq!(align_to_spacing(10, 10), 10);
    }

    #[test]
    fn pct_to_ticks_zero_is_zero() {
        assert_eq!(pct_to_ticks(0.0, 10), 0);
    }

    #[test]
    fn tick_price_round_trip() {
        let tick = 12345;
        let price = tick_to_price(tick, 18, 6);
        let back = price_to_tick(price, 18, 6);
        assert_eq!(back, tick);
    }
}

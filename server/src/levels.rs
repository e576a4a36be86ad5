//! Leveling curve.
//!
//! `xp_for_level(L) = (L-1)^2 * coefficient` and its inverse
//! `calculate_level(xp) = floor(sqrt(xp / coefficient)) + 1`. The two
//! are inverse-consistent: `calculate_level(xp_for_level(L)) == L`
//! for every `L >= 1`.

/// Default leveling coefficient when none is configured.
pub const DEFAULT_COEFFICIENT: i64 = 100;

/// Level for a given xp total. Negative xp or a non-positive
/// coefficient clamps to level 1.
#[must_use]
pub fn calculate_level(xp: i64, coefficient: i64) -> i32 {
    if xp < 0 || coefficient <= 0 {
        return 1;
    }

    let ratio = xp as f64 / coefficient as f64;
    ratio.sqrt().floor() as i32 + 1
}

/// Total xp required to reach a level.
#[must_use]
pub const fn xp_for_level(level: i32, coefficient: i64) -> i64 {
    let steps = (level - 1) as i64;
    steps * steps * coefficient
}

/// Total xp required to reach the level after `current_level`.
#[must_use]
pub const fn xp_for_next_level(current_level: i32, coefficient: i64) -> i64 {
    xp_for_level(current_level + 1, coefficient)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_thresholds_with_default_coefficient() {
        assert_eq!(calculate_level(0, 100), 1);
        assert_eq!(calculate_level(99, 100), 1);
        assert_eq!(calculate_level(100, 100), 2);
        assert_eq!(calculate_level(399, 100), 2);
        assert_eq!(calculate_level(400, 100), 3);
    }

    #[test]
    fn test_negative_xp_clamps_to_level_one() {
        assert_eq!(calculate_level(-1, 100), 1);
        assert_eq!(calculate_level(-500, 100), 1);
    }

    #[test]
    fn test_bad_coefficient_clamps_to_level_one() {
        assert_eq!(calculate_level(10_000, 0), 1);
        assert_eq!(calculate_level(10_000, -5), 1);
    }

    #[test]
    fn test_xp_for_level_curve() {
        assert_eq!(xp_for_level(1, 100), 0);
        assert_eq!(xp_for_level(2, 100), 100);
        assert_eq!(xp_for_level(3, 100), 400);
        assert_eq!(xp_for_level(10, 100), 8100);
    }

    #[test]
    fn test_inverse_consistency() {
        for level in 1..=50 {
            let xp = xp_for_level(level, DEFAULT_COEFFICIENT);
            assert_eq!(calculate_level(xp, DEFAULT_COEFFICIENT), level);
            // One xp short stays on the previous level
            if level > 1 {
                assert_eq!(calculate_level(xp - 1, DEFAULT_COEFFICIENT), level - 1);
            }
        }
    }

    #[test]
    fn test_inverse_consistency_other_coefficients() {
        for coefficient in [1, 7, 50, 250] {
            for level in 1..=20 {
                let xp = xp_for_level(level, coefficient);
                assert_eq!(calculate_level(xp, coefficient), level);
            }
        }
    }

    #[test]
    fn test_xp_for_next_level() {
        assert_eq!(xp_for_next_level(1, 100), 100);
        assert_eq!(xp_for_next_level(2, 100), 400);
    }

    #[test]
    fn test_monotonic() {
        let mut last = 0;
        for xp in (0..5000).step_by(37) {
            let level = calculate_level(xp, 100);
            assert!(level >= last);
            last = level;
        }
    }
}

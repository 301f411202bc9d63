/// Clamp an optional caller-supplied integer into `[min, max]`, using
/// `default` when absent.
pub fn clamp_int(value: Option<i64>, default: i64, min: i64, max: i64) -> i64 {
    value.unwrap_or(default).clamp(min, max.max(min))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_uses_default() {
        assert_eq!(clamp_int(None, 5, 1, 20), 5);
    }

    #[test]
    fn out_of_range_is_clamped() {
        assert_eq!(clamp_int(Some(0), 5, 1, 20), 1);
        assert_eq!(clamp_int(Some(-3), 5, 1, 20), 1);
        assert_eq!(clamp_int(Some(500), 5, 1, 20), 20);
        assert_eq!(clamp_int(Some(7), 5, 1, 20), 7);
    }

    #[test]
    fn inverted_bounds_do_not_panic() {
        assert_eq!(clamp_int(Some(10), 5, 3, 1), 3);
    }
}

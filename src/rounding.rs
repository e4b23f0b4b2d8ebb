/// Round-half-up to the nearest integer mark:
/// `Int(x + 0.5)`
///
/// Marks are non-negative in the domain scale, so half always rounds up
/// (4.5 -> 5, 9.5 -> 10). Applied exactly once, immediately before any
/// threshold comparison; raw values are kept for display and audit only.
pub fn round_half_up(x: f64) -> i64 {
    (x + 0.5).floor() as i64
}

/// True when the rounded mark lands on the other side of `threshold` than
/// the raw mark, i.e. rounding changed a comparison a decision reads.
pub fn rounding_shifted(raw: f64, threshold: i64) -> bool {
    let t = threshold as f64;
    (round_half_up(raw) >= threshold) != (raw >= t)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn half_rounds_up() {
        assert_eq!(round_half_up(4.5), 5);
        assert_eq!(round_half_up(9.5), 10);
        assert_eq!(round_half_up(9.49), 9);
        assert_eq!(round_half_up(0.0), 0);
        assert_eq!(round_half_up(13.0), 13);
    }

    #[test]
    fn rounding_is_idempotent() {
        for x in [0.0, 0.4, 4.5, 6.66, 9.49, 9.5, 17.21] {
            let once = round_half_up(x);
            assert_eq!(round_half_up(once as f64), once);
        }
    }

    #[test]
    fn shift_detection_tracks_threshold_crossing() {
        // 9.5 rounds to 10: raw fails a pass mark of 10, rounded passes.
        assert!(rounding_shifted(9.5, 10));
        assert!(!rounding_shifted(9.4, 10));
        assert!(!rounding_shifted(10.2, 10));
    }
}

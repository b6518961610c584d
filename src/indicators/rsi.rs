/// Calculate the Relative Strength Index over a series of closes.
///
/// Uses Wilder's smoothing: the first average gain/loss is a simple mean
/// over `period`, then each later change is blended in with weight
/// `1/period`. Output is bounded to [0, 100].
///
/// Returns `None` when fewer than `period + 1` closes are available or
/// the series contains non-finite values.
pub fn calculate_rsi(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period + 1 {
        return None;
    }
    if closes.iter().any(|c| !c.is_finite()) {
        return None;
    }

    let changes: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();

    let mut avg_gain = changes[..period]
        .iter()
        .filter(|&&c| c > 0.0)
        .sum::<f64>()
        / period as f64;
    let mut avg_loss = changes[..period]
        .iter()
        .filter(|&&c| c < 0.0)
        .map(|c| c.abs())
        .sum::<f64>()
        / period as f64;

    for &change in &changes[period..] {
        let gain = change.max(0.0);
        let loss = (-change).max(0.0);
        avg_gain = (avg_gain * (period as f64 - 1.0) + gain) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + loss) / period as f64;
    }

    if avg_loss == 0.0 {
        return Some(100.0);
    }

    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rsi_in_bounds() {
        let closes = vec![
            44.0, 44.25, 44.5, 43.75, 44.0, 44.5, 45.0, 45.5, 45.25, 45.5, 46.0, 46.5, 46.25,
            46.0, 46.5,
        ];

        let rsi = calculate_rsi(&closes, 14).unwrap();
        assert!(rsi > 0.0 && rsi < 100.0);
    }

    #[test]
    fn test_rsi_insufficient_data() {
        let closes = vec![100.0, 102.0, 101.0];
        assert!(calculate_rsi(&closes, 14).is_none());
    }

    #[test]
    fn test_rsi_all_gains_saturates() {
        let closes = vec![100.0, 101.0, 102.0, 103.0, 104.0, 105.0];
        assert_eq!(calculate_rsi(&closes, 5), Some(100.0));
    }

    #[test]
    fn test_rsi_steady_decline_is_low() {
        let closes: Vec<f64> = (0..20).map(|i| 100.0 - i as f64).collect();
        let rsi = calculate_rsi(&closes, 14).unwrap();
        assert!(rsi < 5.0, "got {}", rsi);
    }

    #[test]
    fn test_rsi_rejects_non_finite() {
        let mut closes = vec![100.0; 20];
        closes[10] = f64::NAN;
        assert!(calculate_rsi(&closes, 14).is_none());
    }

    #[test]
    fn test_rsi_zero_period() {
        assert!(calculate_rsi(&[1.0, 2.0], 0).is_none());
    }
}

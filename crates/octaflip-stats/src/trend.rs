//! Trend estimation over ordered samples.

/// Least-squares slope of `values` against their position `0, 1, 2, ...`.
///
/// Returns `None` for fewer than two points or when any value is not finite.
///
/// ```
/// # use octaflip_stats::trend::slope;
/// assert_eq!(slope([1.0, 2.0, 3.0]), Some(1.0));
/// assert_eq!(slope([5.0]), None);
/// ```
#[expect(clippy::cast_precision_loss)]
#[must_use]
pub fn slope<I>(values: I) -> Option<f32>
where
    I: IntoIterator<Item = f32>,
{
    let values = values.into_iter().collect::<Vec<_>>();
    if values.len() < 2 || values.iter().any(|v| !v.is_finite()) {
        return None;
    }
    let n = values.len() as f32;
    let mean_x = (n - 1.0) / 2.0;
    let mean_y = values.iter().sum::<f32>() / n;
    let (num, den) = values
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(num, den), (i, &y)| {
            let dx = i as f32 - mean_x;
            (num + dx * (y - mean_y), den + dx * dx)
        });
    Some(num / den)
}

/// Direction of a series, with slopes inside `±epsilon` treated as flat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Improving,
    Flat,
    Declining,
}

impl Trend {
    #[must_use]
    pub fn classify(slope: f32, epsilon: f32) -> Self {
        if slope > epsilon {
            Self::Improving
        } else if slope < -epsilon {
            Self::Declining
        } else {
            Self::Flat
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_series() {
        assert_eq!(slope([0.5; 6]), Some(0.0));
    }

    #[test]
    fn test_descending_series() {
        let s = slope([10.0, 8.0, 6.0, 4.0]).unwrap();
        assert!((s + 2.0).abs() < 1e-6);
        assert_eq!(Trend::classify(s, 0.01), Trend::Declining);
    }

    #[test]
    fn test_non_finite_rejected() {
        assert_eq!(slope([1.0, f32::NAN, 2.0]), None);
    }

    #[test]
    fn test_classify_epsilon() {
        assert_eq!(Trend::classify(0.005, 0.01), Trend::Flat);
        assert_eq!(Trend::classify(0.02, 0.01), Trend::Improving);
    }
}

/// Summary of a batch of `f32` values.
#[derive(Debug, Clone, PartialEq)]
pub struct DescriptiveStats {
    pub count: usize,
    pub min: f32,
    pub max: f32,
    pub mean: f32,
    /// Upper median for even-sized inputs.
    pub median: f32,
    /// Population standard deviation.
    pub std_dev: f32,
}

impl DescriptiveStats {
    /// Computes the summary, or `None` for an empty input.
    ///
    /// Non-finite values are kept; callers that feed losses filter them first.
    ///
    /// ```
    /// # use octaflip_stats::descriptive::DescriptiveStats;
    /// let stats = DescriptiveStats::new([4.0, 1.0, 3.0, 2.0]).unwrap();
    /// assert_eq!(stats.min, 1.0);
    /// assert_eq!(stats.max, 4.0);
    /// assert_eq!(stats.mean, 2.5);
    /// assert_eq!(stats.median, 3.0);
    /// ```
    #[must_use]
    pub fn new<I>(values: I) -> Option<Self>
    where
        I: IntoIterator<Item = f32>,
    {
        let mut values = values.into_iter().collect::<Vec<_>>();
        values.sort_by(f32::total_cmp);
        Self::from_sorted(&values)
    }

    #[expect(clippy::cast_precision_loss)]
    #[must_use]
    pub fn from_sorted(sorted_values: &[f32]) -> Option<Self> {
        debug_assert!(sorted_values.is_sorted_by(|a, b| a.total_cmp(b).is_le()));

        let min = *sorted_values.first()?;
        let max = *sorted_values.last()?;
        let count = sorted_values.len();
        let n = count as f32;
        let mean = sorted_values.iter().sum::<f32>() / n;
        let variance = sorted_values
            .iter()
            .map(|v| (v - mean).powi(2))
            .sum::<f32>()
            / n;

        Some(Self {
            count,
            min,
            max,
            mean,
            median: sorted_values[count / 2],
            std_dev: variance.sqrt(),
        })
    }
}

//! Trend estimation and forecast blending
//!
//! A degree-2 least-squares curve is fitted to the historical series with the
//! day offset as the independent variable, then projected onto the days that
//! follow the last observation. The projection is blended with the feed's own
//! forecast using fixed weights.

use crate::models::HistoricalSeries;
use crate::{ClairityError, Result};

/// Weight applied to the trend projection in [`blend`]
pub const TREND_WEIGHT: f64 = 0.3;

/// Divisor applied to the weighted sum in [`blend`]
pub const BLEND_DIVISOR: f64 = 1.3;

/// Eigenvalues below this fraction of the largest one are treated as zero
const RANK_TOLERANCE: f64 = 1e-10;

/// Fitted quadratic `pm25 = intercept + linear * d + quadratic * d²`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendModel {
    pub intercept: f64,
    pub linear: f64,
    pub quadratic: f64,
    /// Largest day offset seen while fitting
    pub last_offset: i64,
}

impl TrendModel {
    /// Ordinary least squares over every sample of the series.
    ///
    /// Features are centred and the 2x2 normal matrix is pseudo-inverted, which
    /// yields the minimum-norm solution when the offsets do not span three
    /// distinct days.
    pub fn fit(series: &HistoricalSeries) -> Result<Self> {
        let offsets = series.day_offsets();
        let values = series.values();
        let n = values.len() as f64;

        let xs: Vec<f64> = offsets.iter().map(|&d| d as f64).collect();
        let qs: Vec<f64> = xs.iter().map(|x| x * x).collect();

        let mean_x = xs.iter().sum::<f64>() / n;
        let mean_q = qs.iter().sum::<f64>() / n;
        let mean_y = values.iter().sum::<f64>() / n;

        let (mut sxx, mut sxq, mut sqq, mut sxy, mut sqy) = (0.0, 0.0, 0.0, 0.0, 0.0);
        for ((x, q), y) in xs.iter().zip(&qs).zip(&values) {
            let (dx, dq, dy) = (x - mean_x, q - mean_q, y - mean_y);
            sxx += dx * dx;
            sxq += dx * dq;
            sqq += dq * dq;
            sxy += dx * dy;
            sqy += dq * dy;
        }

        let (linear, quadratic) = solve_min_norm(sxx, sxq, sqq, sxy, sqy);
        let intercept = mean_y - linear * mean_x - quadratic * mean_q;

        let model = Self {
            intercept,
            linear,
            quadratic,
            last_offset: offsets.iter().copied().max().unwrap_or(0),
        };

        if !(model.intercept.is_finite() && model.linear.is_finite() && model.quadratic.is_finite())
        {
            return Err(ClairityError::fit(format!(
                "non-finite coefficients over {} samples",
                series.len()
            )));
        }

        Ok(model)
    }

    #[must_use]
    pub fn predict_at(&self, day: f64) -> f64 {
        self.intercept + self.linear * day + self.quadratic * day * day
    }

    /// Offsets following the last observed day, one per requested value
    #[must_use]
    pub fn future_offsets(&self, count: usize) -> Vec<i64> {
        (1..=count as i64).map(|step| self.last_offset + step).collect()
    }

    /// Predictions for the `count` days after the last observation
    #[must_use]
    pub fn project(&self, count: usize) -> Vec<f64> {
        self.future_offsets(count)
            .into_iter()
            .map(|day| self.predict_at(day as f64))
            .collect()
    }
}

/// Pseudo-inverse solve of `[[a, b], [b, c]] * w = [r1, r2]`
fn solve_min_norm(a: f64, b: f64, c: f64, r1: f64, r2: f64) -> (f64, f64) {
    // Jacobi rotation diagonalises the symmetric matrix
    let theta = 0.5 * (2.0 * b).atan2(a - c);
    let (sin, cos) = theta.sin_cos();

    let lambda1 = a * cos * cos + 2.0 * b * sin * cos + c * sin * sin;
    let lambda2 = a * sin * sin - 2.0 * b * sin * cos + c * cos * cos;
    let largest = lambda1.abs().max(lambda2.abs());

    if largest == 0.0 {
        return (0.0, 0.0);
    }

    let mut w = (0.0, 0.0);
    for (lambda, (vx, vy)) in [(lambda1, (cos, sin)), (lambda2, (-sin, cos))] {
        if lambda.abs() <= largest * RANK_TOLERANCE {
            continue;
        }
        let scale = (vx * r1 + vy * r2) / lambda;
        w.0 += scale * vx;
        w.1 += scale * vy;
    }
    w
}

/// Blend the feed forecast with the trend projection.
///
/// `combined[i] = (forecast[i] + trend[i] * 0.3) / 1.3`; elements are paired
/// in order, so both slices are expected to have the same length.
#[must_use]
pub fn blend(forecast: &[f64], trend: &[f64]) -> Vec<f64> {
    forecast
        .iter()
        .zip(trend)
        .map(|(f, t)| (f + t * TREND_WEIGHT) / BLEND_DIVISOR)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::HistoricalSample;
    use chrono::{Duration, NaiveDate, NaiveDateTime};
    use rstest::rstest;

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    fn series_from(points: &[(i64, f64)]) -> HistoricalSeries {
        HistoricalSeries::from_samples(
            points
                .iter()
                .map(|&(day, value)| HistoricalSample::new(start() + Duration::days(day), value))
                .collect(),
        )
        .unwrap()
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-6,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_recovers_exact_quadratic() {
        let points: Vec<(i64, f64)> = (0..10)
            .map(|d| (d, 2.0 + 0.5 * d as f64 + 0.1 * (d * d) as f64))
            .collect();
        let model = TrendModel::fit(&series_from(&points)).unwrap();

        assert_close(model.intercept, 2.0);
        assert_close(model.linear, 0.5);
        assert_close(model.quadratic, 0.1);
        assert_eq!(model.last_offset, 9);
    }

    #[test]
    fn test_projection_starts_after_last_offset() {
        let points: Vec<(i64, f64)> = (0..5).map(|d| (d, 10.0 + 2.0 * d as f64)).collect();
        let model = TrendModel::fit(&series_from(&points)).unwrap();

        assert_eq!(model.future_offsets(3), vec![5, 6, 7]);
        let projected = model.project(3);
        assert_eq!(projected.len(), 3);
        assert_close(projected[0], 20.0);
        assert_close(projected[1], 22.0);
        assert_close(projected[2], 24.0);
    }

    #[test]
    fn test_three_days_interpolate_exactly() {
        let model = TrendModel::fit(&series_from(&[(0, 12.0), (1, 30.0), (2, 15.0)])).unwrap();
        assert_close(model.predict_at(0.0), 12.0);
        assert_close(model.predict_at(1.0), 30.0);
        assert_close(model.predict_at(2.0), 15.0);
    }

    #[test]
    fn test_single_day_predicts_the_mean() {
        let model = TrendModel::fit(&series_from(&[(0, 10.0), (0, 20.0), (0, 30.0)])).unwrap();
        assert_close(model.linear, 0.0);
        assert_close(model.quadratic, 0.0);
        assert_close(model.project(2)[1], 20.0);
    }

    #[test]
    fn test_two_distinct_days_still_fit_the_data() {
        let model = TrendModel::fit(&series_from(&[(0, 10.0), (0, 10.0), (1, 20.0)])).unwrap();
        assert_close(model.predict_at(0.0), 10.0);
        assert_close(model.predict_at(1.0), 20.0);
        assert!(model.project(1)[0].is_finite());
    }

    #[test]
    fn test_blend_literal_values() {
        let combined = blend(&[50.0], &[20.0]);
        assert_eq!(combined.len(), 1);
        assert_eq!(combined[0], (50.0 + 20.0 * 0.3) / 1.3);
        assert!((combined[0] - 43.077).abs() < 1e-3);
    }

    #[rstest]
    #[case(&[], &[], 0)]
    #[case(&[10.0, 20.0], &[10.0, 20.0], 2)]
    #[case(&[10.0, 20.0, 30.0], &[0.0, 0.0, 0.0], 3)]
    fn test_blend_preserves_length(#[case] forecast: &[f64], #[case] trend: &[f64], #[case] len: usize) {
        assert_eq!(blend(forecast, trend).len(), len);
    }

    #[test]
    fn test_blend_equal_inputs_is_not_normalised() {
        // forecast weight 1.0 and trend weight 0.3 over 1.3 keep equal inputs unchanged
        assert_close(blend(&[40.0], &[40.0])[0], 40.0);
        // but zero trend shrinks the forecast
        assert_close(blend(&[13.0], &[0.0])[0], 10.0);
    }
}

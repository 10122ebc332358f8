use crate::model::{MetricKind, MetricRating, MetricValue, Metrics, RunResult, Scores, Summary};

/// Rating band for one metric: values at or under `good` rate good, values
/// over `poor` rate poor, anything between needs improvement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub good: f64,
    pub poor: f64,
}

pub fn thresholds(kind: MetricKind) -> Thresholds {
    let (good, poor) = match kind {
        MetricKind::LargestContentfulPaint => (2500.0, 4000.0),
        MetricKind::FirstContentfulPaint => (1800.0, 3000.0),
        MetricKind::CumulativeLayoutShift => (0.1, 0.25),
        MetricKind::TotalBlockingTime => (200.0, 600.0),
        MetricKind::TimeToInteractive => (3800.0, 7300.0),
        MetricKind::SpeedIndex => (3400.0, 5800.0),
    };
    Thresholds { good, poor }
}

/// Rate an (aggregated) metric value against its fixed band.
pub fn rate_value(kind: MetricKind, value: f64) -> MetricRating {
    let band = thresholds(kind);
    if value <= band.good {
        MetricRating::Good
    } else if value > band.poor {
        MetricRating::Poor
    } else {
        MetricRating::NeedsImprovement
    }
}

/// Rate a single run from the engine's own 0..1 confidence score.
/// A missing score rates poor.
pub fn rate_confidence(score: Option<f64>) -> MetricRating {
    match score {
        Some(s) if s >= 0.9 => MetricRating::Good,
        Some(s) if s >= 0.5 => MetricRating::NeedsImprovement,
        _ => MetricRating::Poor,
    }
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| {
        (sum + finite_or_zero(v), count + 1)
    });
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

pub fn aggregate_scores(runs: &[RunResult]) -> Scores {
    Scores {
        performance: mean(runs.iter().map(|r| r.scores.performance)),
        accessibility: mean(runs.iter().map(|r| r.scores.accessibility)),
        best_practices: mean(runs.iter().map(|r| r.scores.best_practices)),
        seo: mean(runs.iter().map(|r| r.scores.seo)),
    }
}

pub fn aggregate_metrics(runs: &[RunResult]) -> Metrics {
    Metrics::from_fn(|kind| {
        let value = mean(runs.iter().map(|r| r.metrics.get(kind).value));
        MetricValue {
            value,
            unit: kind.unit(),
            rating: rate_value(kind, value),
        }
    })
}

/// Reduce N runs to one summary. Pure; an empty slice yields zeros.
pub fn aggregate(runs: &[RunResult]) -> Summary {
    Summary {
        scores: aggregate_scores(runs),
        metrics: aggregate_metrics(runs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MetricUnit;

    fn run(performance: f64, lcp: f64, cls: f64) -> RunResult {
        RunResult {
            scores: Scores {
                performance,
                accessibility: 1.0,
                best_practices: 0.5,
                seo: 0.0,
            },
            metrics: Metrics::from_fn(|kind| {
                let value = match kind {
                    MetricKind::LargestContentfulPaint => lcp,
                    MetricKind::CumulativeLayoutShift => cls,
                    _ => 100.0,
                };
                MetricValue {
                    value,
                    unit: kind.unit(),
                    // Deliberately unrelated to the value: aggregate must re-rate.
                    rating: MetricRating::Poor,
                }
            }),
            filmstrip: Vec::new(),
        }
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_scores_are_arithmetic_mean() {
        let runs = vec![run(0.8, 0.0, 0.0), run(0.9, 0.0, 0.0), run(1.0, 0.0, 0.0)];
        let summary = aggregate(&runs);
        assert!(approx(summary.scores.performance, 0.9));
        assert!(approx(summary.scores.accessibility, 1.0));
        assert!(approx(summary.scores.best_practices, 0.5));
        assert!(approx(summary.scores.seo, 0.0));
    }

    #[test]
    fn test_aggregate_is_order_independent() {
        let a = run(0.31, 1200.0, 0.02);
        let b = run(0.77, 5100.0, 0.4);
        let c = run(0.55, 2600.0, 0.11);
        let forward = aggregate(&[a.clone(), b.clone(), c.clone()]);
        let reversed = aggregate(&[c, a, b]);
        assert!(approx(forward.scores.performance, reversed.scores.performance));
        assert!(approx(forward.metrics.lcp.value, reversed.metrics.lcp.value));
        assert_eq!(forward.metrics.lcp.rating, reversed.metrics.lcp.rating);
        assert!(approx(forward.metrics.cls.value, reversed.metrics.cls.value));
    }

    #[test]
    fn test_metric_rating_recomputed_from_mean() {
        // 2000 and 3000 average to 2500, which is still good even though
        // each run's own rating says poor.
        let summary = aggregate(&[run(0.5, 2000.0, 0.0), run(0.5, 3000.0, 0.0)]);
        assert!(approx(summary.metrics.lcp.value, 2500.0));
        assert_eq!(summary.metrics.lcp.rating, MetricRating::Good);
        assert_eq!(summary.metrics.lcp.unit, MetricUnit::Ms);
        assert_eq!(summary.metrics.cls.unit, MetricUnit::Unitless);
    }

    #[test]
    fn test_lcp_band_edges() {
        let lcp = MetricKind::LargestContentfulPaint;
        assert_eq!(rate_value(lcp, 2500.0), MetricRating::Good);
        assert_eq!(rate_value(lcp, 2501.0), MetricRating::NeedsImprovement);
        assert_eq!(rate_value(lcp, 4000.0), MetricRating::NeedsImprovement);
        assert_eq!(rate_value(lcp, 4001.0), MetricRating::Poor);
    }

    #[test]
    fn test_every_band_edge() {
        for kind in MetricKind::ALL {
            let band = thresholds(kind);
            assert_eq!(rate_value(kind, band.good), MetricRating::Good);
            assert_eq!(rate_value(kind, band.poor), MetricRating::NeedsImprovement);
            assert_eq!(rate_value(kind, band.poor * 1.01), MetricRating::Poor);
        }
        assert_eq!(
            rate_value(MetricKind::CumulativeLayoutShift, 0.26),
            MetricRating::Poor
        );
    }

    #[test]
    fn test_confidence_rating() {
        assert_eq!(rate_confidence(Some(0.9)), MetricRating::Good);
        assert_eq!(rate_confidence(Some(0.89)), MetricRating::NeedsImprovement);
        assert_eq!(rate_confidence(Some(0.5)), MetricRating::NeedsImprovement);
        assert_eq!(rate_confidence(Some(0.49)), MetricRating::Poor);
        assert_eq!(rate_confidence(None), MetricRating::Poor);
    }

    #[test]
    fn test_non_finite_scores_count_as_zero() {
        let summary = aggregate(&[run(f64::NAN, 0.0, 0.0), run(1.0, 0.0, 0.0)]);
        assert!(approx(summary.scores.performance, 0.5));
    }

    #[test]
    fn test_empty_input_yields_zeros() {
        let summary = aggregate(&[]);
        assert_eq!(summary.scores, Scores::default());
        assert_eq!(summary.metrics.tbt.value, 0.0);
        assert_eq!(summary.metrics.tbt.rating, MetricRating::Good);
    }
}

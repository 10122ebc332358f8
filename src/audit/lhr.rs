//! Normalization of the Lighthouse JSON result (LHR) into a [`RunResult`].

use serde::Deserialize;
use std::collections::HashMap;

use super::AuditError;
use crate::aggregate::rate_confidence;
use crate::model::{FilmstripFrame, MetricKind, MetricValue, Metrics, RunResult, Scores};

const FILMSTRIP_AUDIT: &str = "screenshot-thumbnails";

#[derive(Debug, Deserialize)]
struct Lhr {
    #[serde(default)]
    categories: HashMap<String, Category>,
    #[serde(default)]
    audits: HashMap<String, Audit>,
    #[serde(rename = "runtimeError")]
    runtime_error: Option<RuntimeError>,
}

#[derive(Debug, Deserialize)]
struct Category {
    score: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Audit {
    score: Option<f64>,
    #[serde(rename = "numericValue")]
    numeric_value: Option<f64>,
    details: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RuntimeError {
    code: String,
    message: String,
}

impl Lhr {
    fn category_score(&self, id: &str) -> f64 {
        self.categories
            .get(id)
            .and_then(|c| c.score)
            .unwrap_or(0.0)
    }

    fn metric(&self, kind: MetricKind) -> MetricValue {
        let audit = self.audits.get(kind.audit_id());
        MetricValue {
            value: audit.and_then(|a| a.numeric_value).unwrap_or(0.0),
            unit: kind.unit(),
            rating: rate_confidence(audit.and_then(|a| a.score)),
        }
    }

    fn filmstrip(&self) -> Vec<FilmstripFrame> {
        self.audits
            .get(FILMSTRIP_AUDIT)
            .and_then(|a| a.details.as_ref())
            .and_then(|d| d.get("items"))
            .and_then(|items| Vec::<FilmstripFrame>::deserialize(items).ok())
            .unwrap_or_default()
    }
}

/// Parse raw `lighthouse --output=json` stdout.
pub fn parse_run_result(raw: &[u8]) -> Result<RunResult, AuditError> {
    if raw.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(AuditError::audit("Lighthouse returned no results"));
    }

    let lhr: Lhr = serde_json::from_slice(raw)
        .map_err(|e| AuditError::audit_with_cause("Lighthouse output was not valid JSON", e))?;

    if let Some(err) = &lhr.runtime_error {
        return Err(AuditError::audit_with_cause(
            "Lighthouse reported a runtime error",
            format!("{}: {}", err.code, err.message),
        ));
    }

    Ok(RunResult {
        scores: Scores {
            performance: lhr.category_score("performance"),
            accessibility: lhr.category_score("accessibility"),
            best_practices: lhr.category_score("best-practices"),
            seo: lhr.category_score("seo"),
        },
        metrics: Metrics::from_fn(|kind| lhr.metric(kind)),
        filmstrip: lhr.filmstrip(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MetricRating, MetricUnit};
    use serde_json::json;

    fn sample_lhr() -> serde_json::Value {
        json!({
            "lighthouseVersion": "12.0.0",
            "categories": {
                "performance": {"score": 0.87},
                "accessibility": {"score": 0.95},
                "best-practices": {"score": null},
                "seo": {"score": 1.0}
            },
            "audits": {
                "largest-contentful-paint": {"score": 0.92, "numericValue": 2100.5},
                "first-contentful-paint": {"score": 0.6, "numericValue": 1900.0},
                "cumulative-layout-shift": {"score": 1, "numericValue": 0.01},
                "total-blocking-time": {"score": 0.3, "numericValue": 650.0},
                "interactive": {"numericValue": 4000.0},
                "screenshot-thumbnails": {
                    "score": null,
                    "details": {
                        "type": "filmstrip",
                        "items": [
                            {"timing": 300, "timestamp": 1000300.0, "data": "data:image/jpeg;base64,AAA"},
                            {"timing": 600, "timestamp": 1000600.0, "data": "data:image/jpeg;base64,BBB"}
                        ]
                    }
                }
            }
        })
    }

    #[test]
    fn test_parse_scores_and_metrics() {
        let raw = serde_json::to_vec(&sample_lhr()).unwrap();
        let result = parse_run_result(&raw).unwrap();

        assert_eq!(result.scores.performance, 0.87);
        assert_eq!(result.scores.best_practices, 0.0);
        assert_eq!(result.scores.seo, 1.0);

        assert_eq!(result.metrics.lcp.value, 2100.5);
        assert_eq!(result.metrics.lcp.rating, MetricRating::Good);
        assert_eq!(result.metrics.fcp.rating, MetricRating::NeedsImprovement);
        assert_eq!(result.metrics.tbt.rating, MetricRating::Poor);
        assert_eq!(result.metrics.cls.unit, MetricUnit::Unitless);
    }

    #[test]
    fn test_missing_confidence_rates_poor() {
        let raw = serde_json::to_vec(&sample_lhr()).unwrap();
        let result = parse_run_result(&raw).unwrap();
        // "interactive" has a value but no score.
        assert_eq!(result.metrics.tti.value, 4000.0);
        assert_eq!(result.metrics.tti.rating, MetricRating::Poor);
        // speed-index is absent entirely.
        assert_eq!(result.metrics.si.value, 0.0);
        assert_eq!(result.metrics.si.rating, MetricRating::Poor);
    }

    #[test]
    fn test_filmstrip_frames_in_order() {
        let raw = serde_json::to_vec(&sample_lhr()).unwrap();
        let result = parse_run_result(&raw).unwrap();
        assert_eq!(result.filmstrip.len(), 2);
        assert_eq!(result.filmstrip[0].timing, 300.0);
        assert!(result.filmstrip[1].data.ends_with("BBB"));
    }

    #[test]
    fn test_empty_output_is_audit_error() {
        let err = parse_run_result(b"  \n").unwrap_err();
        assert!(matches!(err, AuditError::Audit { .. }));
        assert_eq!(err.to_string(), "Lighthouse returned no results");
    }

    #[test]
    fn test_runtime_error_is_audit_error() {
        let raw = serde_json::to_vec(&json!({
            "categories": {"performance": {"score": null}},
            "audits": {},
            "runtimeError": {"code": "NO_FCP", "message": "The page did not paint any content."}
        }))
        .unwrap();
        let err = parse_run_result(&raw).unwrap_err();
        assert!(err.detail().contains("NO_FCP"));
    }

    #[test]
    fn test_garbage_is_audit_error() {
        let err = parse_run_result(b"Lighthouse crashed").unwrap_err();
        assert!(matches!(err, AuditError::Audit { cause: Some(_), .. }));
    }
}

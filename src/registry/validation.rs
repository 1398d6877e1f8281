//! Shared validation helpers for capability handlers.
//!
//! Centralizes the range, time and color checks so every capability reports
//! violations with the same wording.

use serde_json::Value;

use crate::error::CapabilityFault;
use crate::model::{Color, Project, TimeRange, Timeline};

use super::binding::describe;
use super::params::ColorArg;

/// Validate a ball timeline index against the current ball count.
pub fn timeline_index(raw: i64, ball_count: usize) -> Result<usize, CapabilityFault> {
    index_in("timelineIndex", raw, ball_count)
}

/// Validate a segment index against the number of segments on a timeline.
pub fn segment_index(raw: i64, len: usize) -> Result<usize, CapabilityFault> {
    index_in("segmentIndex", raw, len)
}

fn index_in(name: &'static str, raw: i64, bound: usize) -> Result<usize, CapabilityFault> {
    usize::try_from(raw)
        .ok()
        .filter(|i| *i < bound)
        .ok_or(CapabilityFault::IndexOutOfRange {
            name,
            value: raw,
            bound,
        })
}

/// Resolve `timelineIndex` to the timeline it names.
pub fn timeline_mut(project: &mut Project, raw: i64) -> Result<(usize, &mut Timeline), CapabilityFault> {
    let index = timeline_index(raw, project.ball_count())?;
    let timeline = project.timeline_mut(index).ok_or(CapabilityFault::IndexOutOfRange {
        name: "timelineIndex",
        value: raw,
        bound: 0,
    })?;
    Ok((index, timeline))
}

/// Validate a time range: both values must be finite, non-negative, and start < end.
pub fn time_range(start: f64, end: f64) -> Result<TimeRange, CapabilityFault> {
    TimeRange::new(start, end).ok_or(CapabilityFault::InvalidTimeRange { start, end })
}

/// Validate that a count is a positive integer that fits in `u32`.
pub fn positive_count(raw: i64, name: &str) -> Result<u32, CapabilityFault> {
    u32::try_from(raw)
        .ok()
        .filter(|n| *n > 0)
        .ok_or_else(|| CapabilityFault::InvalidArgument {
            name: name.to_string(),
            reason: format!("must be a positive integer, got {raw}"),
        })
}

/// Validate that a value is finite and non-negative.
pub fn non_negative_time(value: f64, name: &str) -> Result<f64, CapabilityFault> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(CapabilityFault::InvalidArgument {
            name: name.to_string(),
            reason: format!("must be a finite time >= 0, got {value}"),
        })
    }
}

/// Optional query window: each bound finite and >= 0, end not before start.
pub fn time_window(
    start: Option<f64>,
    end: Option<f64>,
) -> Result<(Option<f64>, Option<f64>), CapabilityFault> {
    let start = start.map(|s| non_negative_time(s, "startTime")).transpose()?;
    let end = end.map(|e| non_negative_time(e, "endTime")).transpose()?;
    if let (Some(s), Some(e)) = (start, end) {
        if e < s {
            return Err(CapabilityFault::InvalidTimeRange { start: s, end: e });
        }
    }
    Ok((start, end))
}

/// Accepts `[r, g, b]` with integer channels 0-255 (integral floats allowed),
/// a color name, or a `#rgb` / `#rrggbb` string.
pub fn resolve_color(arg: &ColorArg) -> Result<Color, CapabilityFault> {
    let invalid = |reason: String| CapabilityFault::InvalidColor { reason };
    match &arg.0 {
        Value::Array(items) => {
            let mut channels = Vec::with_capacity(items.len());
            for item in items {
                let channel = item
                    .as_i64()
                    .or_else(|| {
                        item.as_f64()
                            .filter(|f| f.fract() == 0.0 && f.abs() < 1e6)
                            .map(|f| f as i64)
                    })
                    .ok_or_else(|| {
                        invalid(format!("channels must be integers 0-255, got {}", describe(item)))
                    })?;
                channels.push(channel);
            }
            Color::from_channels(&channels).map_err(invalid)
        }
        Value::String(name) => Color::from_name(name).ok_or_else(|| {
            invalid(format!(
                "unknown color name \"{name}\"; use [r, g, b] or one of: {}",
                Color::names().collect::<Vec<_>>().join(", ")
            ))
        }),
        other => Err(invalid(format!(
            "expected a list of 3 integers 0-255, got {}",
            describe(other)
        ))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn indexes_are_bounded() {
        assert_eq!(timeline_index(0, 4).unwrap(), 0);
        assert_eq!(timeline_index(3, 4).unwrap(), 3);
        assert_eq!(
            timeline_index(4, 4).unwrap_err().to_string(),
            "timelineIndex 4 is out of range [0, 4)"
        );
        assert!(timeline_index(-1, 4).is_err());
        assert!(segment_index(0, 0).is_err());
    }

    #[test]
    fn time_range_must_be_ordered() {
        assert!(time_range(0.0, 1.0).is_ok());
        let err = time_range(2.0, 1.0).unwrap_err();
        assert!(err.to_string().contains("endTime (1) must be greater than startTime (2)"));
        assert!(time_range(1.0, 1.0).is_err());
        assert!(time_range(f64::NAN, 1.0).is_err());
    }

    #[test]
    fn colors_accept_triples_names_and_hex() {
        assert_eq!(resolve_color(&ColorArg(json!([255, 0, 0]))).unwrap(), Color::rgb(255, 0, 0));
        assert_eq!(resolve_color(&ColorArg(json!([0.0, 128.0, 255.0]))).unwrap(), Color::rgb(0, 128, 255));
        assert_eq!(resolve_color(&ColorArg(json!("blue"))).unwrap(), Color::rgb(0, 0, 255));
        assert_eq!(resolve_color(&ColorArg(json!("#00ff00"))).unwrap(), Color::rgb(0, 255, 0));
    }

    #[test]
    fn bad_colors_explain_themselves() {
        let err = resolve_color(&ColorArg(json!([300, 0, 0]))).unwrap_err();
        assert_eq!(err.to_string(), "invalid color: red channel 300 is outside 0-255");
        let err = resolve_color(&ColorArg(json!([1, 2]))).unwrap_err();
        assert!(err.to_string().contains("expected 3 channels"));
        let err = resolve_color(&ColorArg(json!([0.5, 0, 0]))).unwrap_err();
        assert!(err.to_string().contains("must be integers"));
        let err = resolve_color(&ColorArg(json!(7))).unwrap_err();
        assert!(err.to_string().contains("got number 7"));
        let err = resolve_color(&ColorArg(json!("blurple"))).unwrap_err();
        assert!(err.to_string().contains("unknown color name \"blurple\""));
    }

    #[test]
    fn windows_may_be_open_ended() {
        assert_eq!(time_window(None, Some(3.0)).unwrap(), (None, Some(3.0)));
        assert!(time_window(Some(4.0), Some(3.0)).is_err());
        assert!(time_window(Some(-1.0), None).is_err());
    }

    #[test]
    fn counts_must_be_positive() {
        assert_eq!(positive_count(8, "pixelCount").unwrap(), 8);
        assert!(positive_count(0, "pixelCount").is_err());
        assert!(positive_count(-3, "limit").is_err());
    }
}

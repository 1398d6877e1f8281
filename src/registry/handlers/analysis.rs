#![allow(clippy::needless_pass_by_value)]

use serde::Serialize;

use crate::error::CapabilityFault;
use crate::registry::params::BeatsInRangeParams;
use crate::registry::validation::time_window;
use crate::registry::CallContext;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BeatsInRange {
    pub beats: Vec<f64>,
    pub downbeats: Vec<f64>,
    pub count: usize,
    pub tempo: Option<f64>,
}

/// Beats and downbeats with `startTime <= t <= endTime`.
pub fn get_beats_in_range(
    ctx: &CallContext<'_>,
    p: BeatsInRangeParams,
) -> Result<BeatsInRange, CapabilityFault> {
    let (start, end) = match time_window(Some(p.start_time), Some(p.end_time))? {
        (Some(s), Some(e)) => (s, e),
        _ => return Err(CapabilityFault::Internal("time window lost a bound".into())),
    };

    ctx.state.with_analysis(|analysis| {
        let analysis = analysis.ok_or(CapabilityFault::Unavailable {
            what: "audio analysis".into(),
        })?;
        let within = |times: &[f64]| -> Vec<f64> {
            times.iter().copied().filter(|&t| t >= start && t <= end).collect()
        };
        let beats = within(analysis.beat_times());
        let downbeats = within(analysis.downbeat_times());
        Ok(BeatsInRange {
            count: beats.len(),
            beats,
            downbeats,
            tempo: analysis.tempo(),
        })
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{AudioAnalysis, BeatAnalysis, Project};
    use crate::settings::AppSettings;
    use crate::state::AppState;

    fn analysed() -> AppState {
        let analysis = AudioAnalysis {
            duration: 4.0,
            beats: Some(BeatAnalysis {
                beats: vec![0.5, 1.0, 1.5, 2.0, 2.5],
                downbeats: vec![0.5, 2.5],
                tempo: 120.0,
                time_signature: 4,
            }),
            structure: None,
        };
        AppState::new(Project::with_balls(1), AppSettings::default()).with_analysis_data(Some(analysis))
    }

    #[test]
    fn range_is_inclusive_on_both_ends() {
        let state = analysed();
        let ctx = CallContext::new(&state);
        let out = get_beats_in_range(&ctx, BeatsInRangeParams { start_time: 1.0, end_time: 2.5 }).unwrap();
        assert_eq!(out.beats, vec![1.0, 1.5, 2.0, 2.5]);
        assert_eq!(out.downbeats, vec![2.5]);
        assert_eq!(out.count, 4);
        assert_eq!(out.tempo, Some(120.0));
    }

    #[test]
    fn missing_analysis_is_reported() {
        let state = AppState::new(Project::with_balls(1), AppSettings::default());
        let ctx = CallContext::new(&state);
        let err = get_beats_in_range(&ctx, BeatsInRangeParams { start_time: 0.0, end_time: 1.0 }).unwrap_err();
        assert_eq!(err.to_string(), "audio analysis is not available");
    }

    #[test]
    fn inverted_range_is_rejected() {
        let state = analysed();
        let ctx = CallContext::new(&state);
        assert!(get_beats_in_range(&ctx, BeatsInRangeParams { start_time: 3.0, end_time: 1.0 }).is_err());
    }
}

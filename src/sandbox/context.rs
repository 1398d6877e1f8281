use indexmap::IndexMap;
use serde::Serialize;

use crate::model::SongSection;
use crate::script::value::Value;
use crate::state::AppState;

/// Read-only names every script sees.
pub const BINDING_NAMES: [&str; 6] = [
    "BEAT_TIMES",
    "NUM_BALLS",
    "SONG_DURATION",
    "DOWNBEAT_TIMES",
    "TEMPO",
    "SECTIONS",
];

/// (name, type, description) for the script reference, in `BINDING_NAMES` order.
pub const BINDING_DOCS: [(&str, &str, &str); 6] = [
    ("BEAT_TIMES", "list of float", "Beat times in seconds, ascending. Empty without analysis."),
    ("NUM_BALLS", "int", "Number of balls; valid timeline indices are 0 to NUM_BALLS - 1."),
    ("SONG_DURATION", "float", "Song length in seconds, 0 without analysis."),
    ("DOWNBEAT_TIMES", "list of float", "Downbeat (bar start) times in seconds."),
    ("TEMPO", "float or null", "Estimated tempo in BPM."),
    ("SECTIONS", "list of map", "Song sections as {label, start, end}."),
];

/// Snapshot of the song and show taken when a run starts. Each run owns its
/// copy; nothing a script does can reach another run's context.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionContext {
    pub beat_times: Vec<f64>,
    pub downbeat_times: Vec<f64>,
    pub tempo: Option<f64>,
    pub song_duration: f64,
    pub ball_count: usize,
    pub sections: Vec<SongSection>,
}

impl ExecutionContext {
    pub fn capture(state: &AppState) -> Self {
        let ball_count = state.with_project(crate::model::Project::ball_count);
        state.with_analysis(|analysis| match analysis {
            Some(a) => Self {
                beat_times: a.beat_times().to_vec(),
                downbeat_times: a.downbeat_times().to_vec(),
                tempo: a.tempo(),
                song_duration: a.effective_duration(),
                ball_count,
                sections: a.sections().to_vec(),
            },
            None => Self {
                ball_count,
                ..Self::default()
            },
        })
    }

    /// The context as frozen script values, keyed by binding name.
    pub fn bindings(&self) -> IndexMap<String, Value> {
        let floats = |xs: &[f64]| Value::frozen_list(xs.iter().copied().map(Value::Float).collect());
        let sections = self
            .sections
            .iter()
            .map(|s| {
                let mut entry = IndexMap::new();
                entry.insert("label".to_string(), Value::string(s.label.as_str()));
                entry.insert("start".to_string(), Value::Float(s.start));
                entry.insert("end".to_string(), Value::Float(s.end));
                Value::frozen_map(entry)
            })
            .collect();

        let mut bindings = IndexMap::new();
        bindings.insert("BEAT_TIMES".to_string(), floats(&self.beat_times));
        bindings.insert(
            "NUM_BALLS".to_string(),
            Value::Int(i64::try_from(self.ball_count).unwrap_or(i64::MAX)),
        );
        bindings.insert("SONG_DURATION".to_string(), Value::Float(self.song_duration));
        bindings.insert("DOWNBEAT_TIMES".to_string(), floats(&self.downbeat_times));
        bindings.insert("TEMPO".to_string(), self.tempo.map_or(Value::Null, Value::Float));
        bindings.insert("SECTIONS".to_string(), Value::frozen_list(sections));
        bindings
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::model::{AudioAnalysis, BeatAnalysis, Project};
    use crate::settings::AppSettings;

    fn analysis() -> AudioAnalysis {
        AudioAnalysis {
            duration: 0.0,
            beats: Some(BeatAnalysis {
                beats: vec![0.5, 1.0, 1.5],
                downbeats: vec![0.5],
                tempo: 120.0,
                time_signature: 4,
            }),
            structure: None,
        }
    }

    #[test]
    fn capture_without_analysis_still_counts_balls() {
        let state = AppState::new(Project::with_balls(3), AppSettings::default());
        let ctx = ExecutionContext::capture(&state);
        assert_eq!(ctx.ball_count, 3);
        assert!(ctx.beat_times.is_empty());
        assert!(ctx.tempo.is_none());
    }

    #[test]
    fn bindings_cover_every_name_and_are_frozen() {
        let state = AppState::new(Project::with_balls(2), AppSettings::default())
            .with_analysis_data(Some(analysis()));
        let ctx = ExecutionContext::capture(&state);
        assert_eq!(ctx.song_duration, 1.5);
        let bindings = ctx.bindings();
        let names: Vec<_> = bindings.keys().map(String::as_str).collect();
        assert_eq!(names, BINDING_NAMES.to_vec());
        let documented: Vec<_> = BINDING_DOCS.iter().map(|(name, _, _)| *name).collect();
        assert_eq!(documented, BINDING_NAMES.to_vec());
        let Value::List(beats) = &bindings["BEAT_TIMES"] else {
            panic!("BEAT_TIMES is not a list");
        };
        assert!(beats.is_frozen());
        assert_eq!(beats.len(), 3);
    }

    #[test]
    fn captured_context_does_not_follow_later_changes() {
        let state = AppState::new(Project::with_balls(2), AppSettings::default());
        let ctx = ExecutionContext::capture(&state);
        state.with_project_mut(|p| p.timelines.push(crate::model::Timeline::default()));
        assert_eq!(ctx.ball_count, 2);
    }
}

use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ── Audio analysis (read-only collaborator data) ──────────────────

/// Audio analysis results for the current song. Produced by an external
/// pipeline; this crate only reads it. Each part is optional so a partially
/// analyzed song still loads.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct AudioAnalysis {
    /// Song length in seconds.
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub beats: Option<BeatAnalysis>,
    #[serde(default)]
    pub structure: Option<StructureAnalysis>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct BeatAnalysis {
    /// Beat times in seconds
    pub beats: Vec<f64>,
    /// Downbeat times in seconds (first beat of each measure)
    #[serde(default)]
    pub downbeats: Vec<f64>,
    /// Estimated tempo in BPM
    #[serde(default)]
    pub tempo: f64,
    /// Time signature numerator (e.g., 4 for 4/4)
    #[serde(default = "default_time_signature")]
    pub time_signature: u32,
}

fn default_time_signature() -> u32 {
    4
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StructureAnalysis {
    pub sections: Vec<SongSection>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SongSection {
    /// Section label: "intro", "verse", "chorus", "bridge", "outro", etc.
    pub label: String,
    /// Start time in seconds
    pub start: f64,
    /// End time in seconds
    pub end: f64,
}

impl AudioAnalysis {
    pub fn beat_times(&self) -> &[f64] {
        self.beats.as_ref().map_or(&[], |b| b.beats.as_slice())
    }

    pub fn downbeat_times(&self) -> &[f64] {
        self.beats.as_ref().map_or(&[], |b| b.downbeats.as_slice())
    }

    pub fn tempo(&self) -> Option<f64> {
        self.beats.as_ref().map(|b| b.tempo).filter(|t| *t > 0.0)
    }

    pub fn sections(&self) -> &[SongSection] {
        self.structure.as_ref().map_or(&[], |s| s.sections.as_slice())
    }

    /// Duration, falling back to the last known event when the pipeline did
    /// not report one.
    pub fn effective_duration(&self) -> f64 {
        if self.duration > 0.0 {
            return self.duration;
        }
        let last_beat = self.beat_times().last().copied().unwrap_or(0.0);
        let last_section = self.sections().iter().map(|s| s.end).fold(0.0, f64::max);
        last_beat.max(last_section)
    }
}

// ── Aligned lyrics (read-only collaborator data) ──────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LyricsAnalysis {
    /// Word-level timestamps
    pub words: Vec<LyricWord>,
    /// Detected language code (e.g., "en")
    #[serde(default)]
    pub language: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LyricWord {
    pub word: String,
    /// Start time in seconds
    pub start: f64,
    /// End time in seconds
    pub end: f64,
}

/// Lowercase and strip surrounding punctuation so "Love," matches "love".
pub fn normalize_word(word: &str) -> String {
    word.trim_matches(|c: char| !c.is_alphanumeric() && c != '\'')
        .to_lowercase()
}

impl LyricsAnalysis {
    /// Occurrences of `word` whose start falls in `[start, end]`, in time order.
    pub fn find_word(&self, word: &str, start: Option<f64>, end: Option<f64>) -> Vec<&LyricWord> {
        let needle = normalize_word(word);
        let mut hits: Vec<&LyricWord> = self
            .words
            .iter()
            .filter(|w| normalize_word(&w.word) == needle)
            .filter(|w| start.is_none_or(|s| w.start >= s))
            .filter(|w| end.is_none_or(|e| w.start <= e))
            .collect();
        hits.sort_by(|a, b| a.start.total_cmp(&b.start));
        hits
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn lyrics() -> LyricsAnalysis {
        let word = |w: &str, start: f64| LyricWord {
            word: w.to_string(),
            start,
            end: start + 0.3,
        };
        LyricsAnalysis {
            words: vec![
                word("Love", 4.0),
                word("me", 4.4),
                word("love,", 1.0),
                word("LOVE!", 9.5),
            ],
            language: "en".into(),
        }
    }

    #[test]
    fn find_word_ignores_case_and_punctuation() {
        let l = lyrics();
        let hits = l.find_word("love", None, None);
        let starts: Vec<f64> = hits.iter().map(|w| w.start).collect();
        assert_eq!(starts, vec![1.0, 4.0, 9.5]);
    }

    #[test]
    fn find_word_respects_window() {
        let l = lyrics();
        let hits = l.find_word("Love", Some(2.0), Some(9.0));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].start, 4.0);
    }

    #[test]
    fn effective_duration_falls_back_to_beats() {
        let analysis: AudioAnalysis = serde_json::from_value(serde_json::json!({
            "beats": { "beats": [0.5, 1.0, 1.5], "tempo": 120.0 }
        }))
        .unwrap();
        assert_eq!(analysis.effective_duration(), 1.5);
        assert_eq!(analysis.tempo(), Some(120.0));
        assert!(analysis.sections().is_empty());
    }
}

#![allow(clippy::needless_pass_by_value)]

use serde::Serialize;

use crate::error::CapabilityFault;
use crate::model::LyricWord;
use crate::registry::params::WordTimestampsParams;
use crate::registry::validation::{positive_count, time_window};
use crate::registry::CallContext;

#[derive(Debug, Clone, Serialize)]
pub struct WordTimestamps {
    pub word: String,
    pub matches: Vec<LyricWord>,
    pub count: usize,
}

pub fn get_word_timestamps(
    ctx: &CallContext<'_>,
    p: WordTimestampsParams,
) -> Result<WordTimestamps, CapabilityFault> {
    if p.word.trim().is_empty() {
        return Err(CapabilityFault::InvalidArgument {
            name: "word".into(),
            reason: "must not be empty".into(),
        });
    }
    let (start, end) = time_window(p.start_time, p.end_time)?;
    let limit = p.limit.map(|n| positive_count(n, "limit")).transpose()?;

    ctx.state.with_lyrics(|lyrics| {
        let lyrics = lyrics.ok_or(CapabilityFault::Unavailable {
            what: "aligned lyrics".into(),
        })?;
        let mut matches: Vec<LyricWord> = lyrics
            .find_word(&p.word, start, end)
            .into_iter()
            .cloned()
            .collect();
        if let Some(limit) = limit {
            matches.truncate(limit as usize);
        }
        Ok(WordTimestamps {
            word: p.word.clone(),
            count: matches.len(),
            matches,
        })
    })
}

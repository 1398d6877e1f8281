use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::timeline::Timeline;

/// A ball show: one color timeline per ball, indexed by ball number.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Project {
    #[serde(default)]
    pub name: String,
    pub timelines: Vec<Timeline>,
    /// Pixel count given to new segments when the caller does not pick one.
    #[serde(default = "default_pixel_count")]
    pub default_pixel_count: u32,
}

fn default_pixel_count() -> u32 {
    1
}

impl Default for Project {
    fn default() -> Self {
        Self::with_balls(0)
    }
}

impl Project {
    /// An empty show with `ball_count` blank timelines.
    pub fn with_balls(ball_count: usize) -> Self {
        Self {
            name: String::new(),
            timelines: vec![Timeline::default(); ball_count],
            default_pixel_count: default_pixel_count(),
        }
    }

    pub fn ball_count(&self) -> usize {
        self.timelines.len()
    }

    pub fn timeline(&self, index: usize) -> Option<&Timeline> {
        self.timelines.get(index)
    }

    pub fn timeline_mut(&mut self, index: usize) -> Option<&mut Timeline> {
        self.timelines.get_mut(index)
    }

    pub fn segment_count(&self) -> usize {
        self.timelines.iter().map(Timeline::len).sum()
    }
}

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::color::Color;

/// A time range within a show. Start must be < end, both in seconds.
/// Constructed via `TimeRange::new` which enforces this invariant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[serde(try_from = "TimeRangeRaw")]
#[ts(export)]
pub struct TimeRange {
    start: f64,
    end: f64,
}

#[derive(Deserialize)]
struct TimeRangeRaw {
    start: f64,
    end: f64,
}

impl TryFrom<TimeRangeRaw> for TimeRange {
    type Error = String;
    fn try_from(raw: TimeRangeRaw) -> Result<Self, String> {
        TimeRange::new(raw.start, raw.end)
            .ok_or_else(|| format!("Invalid TimeRange: start={}, end={}", raw.start, raw.end))
    }
}

impl TimeRange {
    /// Create a time range. Returns None if start >= end, either is negative,
    /// or either is not finite.
    pub fn new(start: f64, end: f64) -> Option<Self> {
        if start.is_finite() && end.is_finite() && start >= 0.0 && end > start {
            Some(Self { start, end })
        } else {
            None
        }
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn end(&self) -> f64 {
        self.end
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Returns true if the given time falls within this range (inclusive start, exclusive end).
    pub fn contains(&self, t: f64) -> bool {
        t >= self.start && t < self.end
    }

    /// Half-open ranges overlap when each starts before the other ends.
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// One colored span on a ball's timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(try_from = "SegmentRaw", rename_all = "camelCase")]
#[ts(export)]
pub struct Segment {
    start_time: f64,
    end_time: f64,
    #[ts(type = "[number, number, number]")]
    pub color: Color,
    pub pixel_count: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SegmentRaw {
    start_time: f64,
    end_time: f64,
    color: Color,
    #[serde(default = "default_pixel_count")]
    pixel_count: u32,
}

fn default_pixel_count() -> u32 {
    1
}

impl TryFrom<SegmentRaw> for Segment {
    type Error = String;
    fn try_from(raw: SegmentRaw) -> Result<Self, String> {
        let range = TimeRange::new(raw.start_time, raw.end_time).ok_or_else(|| {
            format!(
                "Invalid segment: startTime={}, endTime={}",
                raw.start_time, raw.end_time
            )
        })?;
        Ok(Segment::new(range, raw.color, raw.pixel_count))
    }
}

impl Segment {
    pub fn new(range: TimeRange, color: Color, pixel_count: u32) -> Self {
        Self {
            start_time: range.start(),
            end_time: range.end(),
            color,
            pixel_count,
        }
    }

    pub fn range(&self) -> TimeRange {
        TimeRange {
            start: self.start_time,
            end: self.end_time,
        }
    }

    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    pub fn end_time(&self) -> f64 {
        self.end_time
    }

    fn with_bounds(&self, start: f64, end: f64) -> Option<Segment> {
        TimeRange::new(start, end).map(|range| Segment::new(range, self.color, self.pixel_count))
    }
}

/// How an insert resolved conflicts with segments already on the timeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct InsertReport {
    /// Position of the inserted segment after sorting by start time.
    pub segment_index: usize,
    /// Segments fully covered by the new one.
    pub removed: usize,
    /// Segments shortened on one side.
    pub trimmed: usize,
    /// Segments that straddled the new one and were cut in two.
    pub split: usize,
}

/// A single ball's color timeline. Segments are kept sorted by start time and
/// never overlap.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[serde(try_from = "TimelineRaw")]
#[ts(export)]
pub struct Timeline {
    segments: Vec<Segment>,
}

#[derive(Deserialize)]
struct TimelineRaw {
    #[serde(default)]
    segments: Vec<Segment>,
}

impl TryFrom<TimelineRaw> for Timeline {
    type Error = String;
    fn try_from(raw: TimelineRaw) -> Result<Self, String> {
        let mut timeline = Timeline::default();
        for segment in raw.segments {
            timeline.insert(segment);
        }
        Ok(timeline)
    }
}

impl Timeline {
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Segment> {
        self.segments.get(index)
    }

    /// Insert a segment, trimming, splitting or removing whatever it overlaps
    /// so the new segment covers its range exactly.
    pub fn insert(&mut self, segment: Segment) -> InsertReport {
        let new_range = segment.range();
        let mut report = InsertReport::default();
        let mut kept = Vec::with_capacity(self.segments.len() + 2);

        for existing in self.segments.drain(..) {
            let range = existing.range();
            if !range.overlaps(&new_range) {
                kept.push(existing);
                continue;
            }
            let keeps_left = range.start() < new_range.start();
            let keeps_right = range.end() > new_range.end();
            match (keeps_left, keeps_right) {
                (true, true) => {
                    report.split += 1;
                    kept.extend(existing.with_bounds(range.start(), new_range.start()));
                    kept.extend(existing.with_bounds(new_range.end(), range.end()));
                }
                (true, false) => {
                    report.trimmed += 1;
                    kept.extend(existing.with_bounds(range.start(), new_range.start()));
                }
                (false, true) => {
                    report.trimmed += 1;
                    kept.extend(existing.with_bounds(new_range.end(), range.end()));
                }
                (false, false) => report.removed += 1,
            }
        }

        let index = kept.partition_point(|s| s.start_time < new_range.start());
        kept.insert(index, segment);
        self.segments = kept;
        report.segment_index = index;
        report
    }

    pub fn remove(&mut self, index: usize) -> Option<Segment> {
        (index < self.segments.len()).then(|| self.segments.remove(index))
    }

    /// Remove every segment, returning how many there were.
    pub fn clear(&mut self) -> usize {
        let count = self.segments.len();
        self.segments.clear();
        count
    }

    /// True when segments are sorted and pairwise disjoint.
    pub fn is_consistent(&self) -> bool {
        self.segments
            .windows(2)
            .all(|w| matches!(w, [a, b] if a.end_time <= b.start_time))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn seg(start: f64, end: f64, color: Color) -> Segment {
        Segment::new(TimeRange::new(start, end).unwrap(), color, 1)
    }

    fn bounds(t: &Timeline) -> Vec<(f64, f64)> {
        t.segments().iter().map(|s| (s.start_time(), s.end_time())).collect()
    }

    const RED: Color = Color::rgb(255, 0, 0);
    const BLUE: Color = Color::rgb(0, 0, 255);

    #[test]
    fn time_range_rejects_bad_bounds() {
        assert!(TimeRange::new(1.0, 1.0).is_none());
        assert!(TimeRange::new(2.0, 1.0).is_none());
        assert!(TimeRange::new(-0.5, 1.0).is_none());
        assert!(TimeRange::new(0.0, f64::INFINITY).is_none());
        assert!(TimeRange::new(0.0, 1.0).unwrap().contains(0.0));
        assert!(!TimeRange::new(0.0, 1.0).unwrap().contains(1.0));
    }

    #[test]
    fn adjacent_segments_do_not_conflict() {
        let mut t = Timeline::default();
        for i in 0..3 {
            let report = t.insert(seg(f64::from(i), f64::from(i + 1), RED));
            assert_eq!(report.removed + report.trimmed + report.split, 0);
        }
        assert_eq!(bounds(&t), vec![(0.0, 1.0), (1.0, 2.0), (2.0, 3.0)]);
        assert!(t.is_consistent());
    }

    #[test]
    fn insert_keeps_sorted_order() {
        let mut t = Timeline::default();
        t.insert(seg(4.0, 5.0, RED));
        let report = t.insert(seg(1.0, 2.0, RED));
        assert_eq!(report.segment_index, 0);
        assert_eq!(bounds(&t), vec![(1.0, 2.0), (4.0, 5.0)]);
    }

    #[test]
    fn covering_insert_removes_contained_segments() {
        let mut t = Timeline::default();
        t.insert(seg(1.0, 2.0, RED));
        t.insert(seg(2.0, 3.0, RED));
        let report = t.insert(seg(0.5, 3.5, BLUE));
        assert_eq!(report.removed, 2);
        assert_eq!(bounds(&t), vec![(0.5, 3.5)]);
    }

    #[test]
    fn partial_overlap_trims_neighbors() {
        let mut t = Timeline::default();
        t.insert(seg(0.0, 2.0, RED));
        t.insert(seg(3.0, 5.0, RED));
        let report = t.insert(seg(1.5, 3.5, BLUE));
        assert_eq!(report.trimmed, 2);
        assert_eq!(report.segment_index, 1);
        assert_eq!(bounds(&t), vec![(0.0, 1.5), (1.5, 3.5), (3.5, 5.0)]);
        assert_eq!(t.get(1).unwrap().color, BLUE);
        assert!(t.is_consistent());
    }

    #[test]
    fn straddled_segment_is_split() {
        let mut t = Timeline::default();
        t.insert(seg(0.0, 10.0, RED));
        let report = t.insert(seg(4.0, 6.0, BLUE));
        assert_eq!(report.split, 1);
        assert_eq!(bounds(&t), vec![(0.0, 4.0), (4.0, 6.0), (6.0, 10.0)]);
        assert_eq!(t.get(0).unwrap().color, RED);
        assert_eq!(t.get(2).unwrap().color, RED);
    }

    #[test]
    fn identical_range_replaces() {
        let mut t = Timeline::default();
        t.insert(seg(1.0, 2.0, RED));
        let report = t.insert(seg(1.0, 2.0, BLUE));
        assert_eq!(report.removed, 1);
        assert_eq!(t.len(), 1);
        assert_eq!(t.get(0).unwrap().color, BLUE);
    }

    #[test]
    fn remove_and_clear() {
        let mut t = Timeline::default();
        t.insert(seg(0.0, 1.0, RED));
        t.insert(seg(1.0, 2.0, RED));
        assert!(t.remove(5).is_none());
        assert_eq!(t.remove(0).unwrap().start_time(), 0.0);
        assert_eq!(t.clear(), 1);
        assert_eq!(t.clear(), 0);
        assert!(t.is_empty());
    }

    #[test]
    fn deserializing_overlapping_segments_resolves_them() {
        let t: Timeline = serde_json::from_value(serde_json::json!({
            "segments": [
                { "startTime": 0.0, "endTime": 4.0, "color": [255, 0, 0] },
                { "startTime": 2.0, "endTime": 3.0, "color": [0, 0, 255], "pixelCount": 8 }
            ]
        }))
        .unwrap();
        assert_eq!(bounds(&t), vec![(0.0, 2.0), (2.0, 3.0), (3.0, 4.0)]);
        assert_eq!(t.get(1).unwrap().pixel_count, 8);
    }

    #[test]
    fn segment_rejects_inverted_range() {
        let result: Result<Segment, _> = serde_json::from_value(serde_json::json!({
            "startTime": 3.0, "endTime": 1.0, "color": [0, 0, 0]
        }));
        assert!(result.is_err());
    }
}

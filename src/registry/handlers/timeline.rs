#![allow(clippy::needless_pass_by_value)]

use serde::Serialize;

use crate::error::CapabilityFault;
use crate::model::{Color, InsertReport, Segment};
use crate::registry::params::{
    CreateSegmentParams, ModifySegmentParams, NoParams, SegmentRefParams, TimelineParams,
};
use crate::registry::validation::{
    positive_count, resolve_color, segment_index, time_range, timeline_index, timeline_mut,
};
use crate::registry::CallContext;

// ── Descriptors ─────────────────────────────────────────────────

/// What a create or modify did to one timeline.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentChange {
    pub timeline_index: usize,
    pub segment_index: usize,
    pub start_time: f64,
    pub end_time: f64,
    pub color: Color,
    pub pixel_count: u32,
    /// Other segments removed, trimmed or split to make room.
    pub removed: usize,
    pub trimmed: usize,
    pub split: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous: Option<Segment>,
}

impl SegmentChange {
    fn new(timeline_index: usize, segment: &Segment, report: InsertReport) -> Self {
        Self {
            timeline_index,
            segment_index: report.segment_index,
            start_time: segment.start_time(),
            end_time: segment.end_time(),
            color: segment.color,
            pixel_count: segment.pixel_count,
            removed: report.removed,
            trimmed: report.trimmed,
            split: report.split,
            previous: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentDeleted {
    pub timeline_index: usize,
    pub segment_index: usize,
    pub deleted: Segment,
    pub remaining: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineCleared {
    pub timeline_index: usize,
    /// Segments the timeline held before the call.
    pub removed_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllTimelinesCleared {
    pub timelines_cleared: usize,
    pub removed_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentList {
    pub timeline_index: usize,
    pub count: usize,
    pub segments: Vec<Segment>,
}

// ── Handlers ────────────────────────────────────────────────────

pub fn create_segment(
    ctx: &CallContext<'_>,
    p: CreateSegmentParams,
) -> Result<SegmentChange, CapabilityFault> {
    let range = time_range(p.start_time, p.end_time)?;
    let color = resolve_color(&p.color)?;
    let pixel_count = p
        .pixel_count
        .map(|n| positive_count(n, "pixelCount"))
        .transpose()?;

    ctx.mutate_project(|project| {
        let pixel_count = pixel_count.unwrap_or(project.default_pixel_count);
        let (index, timeline) = timeline_mut(project, p.timeline_index)?;
        let segment = Segment::new(range, color, pixel_count);
        let report = timeline.insert(segment.clone());
        Ok(SegmentChange::new(index, &segment, report))
    })
}

pub fn modify_segment(
    ctx: &CallContext<'_>,
    p: ModifySegmentParams,
) -> Result<SegmentChange, CapabilityFault> {
    if p.start_time.is_none() && p.end_time.is_none() && p.color.is_none() && p.pixel_count.is_none() {
        return Err(CapabilityFault::InvalidArgument {
            name: "modify_segment".into(),
            reason: "needs at least one of startTime, endTime, color, pixelCount".into(),
        });
    }
    let color = p.color.as_ref().map(resolve_color).transpose()?;
    let pixel_count = p
        .pixel_count
        .map(|n| positive_count(n, "pixelCount"))
        .transpose()?;

    ctx.mutate_project(|project| {
        let (index, timeline) = timeline_mut(project, p.timeline_index)?;
        let seg_index = segment_index(p.segment_index, timeline.len())?;
        let previous = timeline
            .get(seg_index)
            .cloned()
            .ok_or(CapabilityFault::IndexOutOfRange {
                name: "segmentIndex",
                value: p.segment_index,
                bound: timeline.len(),
            })?;
        let range = time_range(
            p.start_time.unwrap_or(previous.start_time()),
            p.end_time.unwrap_or(previous.end_time()),
        )?;
        let updated = Segment::new(
            range,
            color.unwrap_or(previous.color),
            pixel_count.unwrap_or(previous.pixel_count),
        );

        // Everything is validated; from here the change cannot fail.
        timeline.remove(seg_index);
        let report = timeline.insert(updated.clone());
        let mut change = SegmentChange::new(index, &updated, report);
        change.previous = Some(previous);
        Ok(change)
    })
}

pub fn delete_segment(
    ctx: &CallContext<'_>,
    p: SegmentRefParams,
) -> Result<SegmentDeleted, CapabilityFault> {
    ctx.mutate_project(|project| {
        let (index, timeline) = timeline_mut(project, p.timeline_index)?;
        let seg_index = segment_index(p.segment_index, timeline.len())?;
        let deleted = timeline.remove(seg_index).ok_or(CapabilityFault::IndexOutOfRange {
            name: "segmentIndex",
            value: p.segment_index,
            bound: timeline.len(),
        })?;
        Ok(SegmentDeleted {
            timeline_index: index,
            segment_index: seg_index,
            deleted,
            remaining: timeline.len(),
        })
    })
}

pub fn clear_timeline(
    ctx: &CallContext<'_>,
    p: TimelineParams,
) -> Result<TimelineCleared, CapabilityFault> {
    ctx.mutate_project(|project| {
        let (index, timeline) = timeline_mut(project, p.timeline_index)?;
        Ok(TimelineCleared {
            timeline_index: index,
            removed_count: timeline.clear(),
        })
    })
}

pub fn clear_all_timelines(
    ctx: &CallContext<'_>,
    _p: NoParams,
) -> Result<AllTimelinesCleared, CapabilityFault> {
    ctx.mutate_project(|project| {
        let removed_count = project.timelines.iter_mut().map(|t| t.clear()).sum();
        Ok(AllTimelinesCleared {
            timelines_cleared: project.ball_count(),
            removed_count,
        })
    })
}

pub fn list_segments(
    ctx: &CallContext<'_>,
    p: TimelineParams,
) -> Result<SegmentList, CapabilityFault> {
    ctx.read_project(|project| {
        let index = timeline_index(p.timeline_index, project.ball_count())?;
        let segments = project
            .timeline(index)
            .map(|t| t.segments().to_vec())
            .unwrap_or_default();
        Ok(SegmentList {
            timeline_index: index,
            count: segments.len(),
            segments,
        })
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::model::Project;
    use crate::registry::params::ColorArg;
    use crate::settings::AppSettings;
    use crate::state::AppState;
    use proptest::prelude::*;
    use serde_json::json;

    fn state(balls: usize) -> AppState {
        AppState::new(Project::with_balls(balls), AppSettings::default())
    }

    fn create(ctx: &CallContext<'_>, t: i64, s: f64, e: f64) -> Result<SegmentChange, CapabilityFault> {
        create_segment(
            ctx,
            CreateSegmentParams {
                timeline_index: t,
                start_time: s,
                end_time: e,
                color: ColorArg(json!([255, 0, 0])),
                pixel_count: None,
            },
        )
    }

    #[test]
    fn create_covers_range_exactly_without_overlaps() {
        let state = state(2);
        let ctx = CallContext::new(&state);
        create(&ctx, 1, 0.0, 4.0).unwrap();
        let change = create(&ctx, 1, 1.0, 2.0).unwrap();
        assert_eq!(change.split, 1);
        assert_eq!(change.segment_index, 1);

        state.with_project(|p| {
            let t = p.timeline(1).unwrap();
            assert!(t.is_consistent());
            let seg = t.get(change.segment_index).unwrap();
            assert_eq!((seg.start_time(), seg.end_time()), (1.0, 2.0));
            assert_eq!(seg.color, Color::rgb(255, 0, 0));
        });
    }

    #[test]
    fn invalid_create_changes_nothing() {
        let state = state(2);
        let ctx = CallContext::new(&state);
        assert!(matches!(
            create(&ctx, 2, 0.0, 1.0),
            Err(CapabilityFault::IndexOutOfRange { name: "timelineIndex", value: 2, bound: 2 })
        ));
        assert!(matches!(
            create(&ctx, 0, 3.0, 1.0),
            Err(CapabilityFault::InvalidTimeRange { .. })
        ));
        assert_eq!(state.with_project(Project::segment_count), 0);
    }

    #[test]
    fn create_uses_default_pixel_count() {
        let state = state(1);
        state.with_project_mut(|p| p.default_pixel_count = 12);
        let ctx = CallContext::new(&state);
        assert_eq!(create(&ctx, 0, 0.0, 1.0).unwrap().pixel_count, 12);
    }

    #[test]
    fn clear_twice_reports_true_prior_counts() {
        let state = state(1);
        let ctx = CallContext::new(&state);
        for i in 0..3 {
            create(&ctx, 0, f64::from(i), f64::from(i) + 1.0).unwrap();
        }
        let first = clear_timeline(&ctx, TimelineParams { timeline_index: 0 }).unwrap();
        let second = clear_timeline(&ctx, TimelineParams { timeline_index: 0 }).unwrap();
        assert_eq!(first.removed_count, 3);
        assert_eq!(second.removed_count, 0);
        assert!(state.with_project(|p| p.timeline(0).unwrap().is_empty()));
    }

    #[test]
    fn modify_moves_and_recolors_one_segment() {
        let state = state(1);
        let ctx = CallContext::new(&state);
        create(&ctx, 0, 0.0, 1.0).unwrap();
        create(&ctx, 0, 2.0, 3.0).unwrap();

        let change = modify_segment(
            &ctx,
            ModifySegmentParams {
                timeline_index: 0,
                segment_index: 0,
                start_time: Some(0.5),
                end_time: Some(2.5),
                color: Some(ColorArg(json!("blue"))),
                pixel_count: None,
            },
        )
        .unwrap();
        assert_eq!(change.previous.as_ref().unwrap().start_time(), 0.0);
        assert_eq!(change.trimmed, 1);

        state.with_project(|p| {
            let t = p.timeline(0).unwrap();
            let bounds: Vec<_> = t.segments().iter().map(|s| (s.start_time(), s.end_time())).collect();
            assert_eq!(bounds, vec![(0.5, 2.5), (2.5, 3.0)]);
            assert_eq!(t.segments()[0].color, Color::rgb(0, 0, 255));
        });
    }

    #[test]
    fn modify_with_inverted_result_leaves_segment_alone() {
        let state = state(1);
        let ctx = CallContext::new(&state);
        create(&ctx, 0, 1.0, 2.0).unwrap();
        let err = modify_segment(
            &ctx,
            ModifySegmentParams {
                timeline_index: 0,
                segment_index: 0,
                start_time: Some(5.0),
                end_time: None,
                color: None,
                pixel_count: None,
            },
        )
        .unwrap_err();
        assert!(matches!(err, CapabilityFault::InvalidTimeRange { .. }));
        state.with_project(|p| assert_eq!(p.timeline(0).unwrap().get(0).unwrap().start_time(), 1.0));
    }

    #[test]
    fn delete_reports_the_removed_segment() {
        let state = state(1);
        let ctx = CallContext::new(&state);
        create(&ctx, 0, 0.0, 1.0).unwrap();
        create(&ctx, 0, 1.0, 2.0).unwrap();
        let deleted = delete_segment(&ctx, SegmentRefParams { timeline_index: 0, segment_index: 1 }).unwrap();
        assert_eq!(deleted.deleted.start_time(), 1.0);
        assert_eq!(deleted.remaining, 1);
        let err = delete_segment(&ctx, SegmentRefParams { timeline_index: 0, segment_index: 1 }).unwrap_err();
        assert_eq!(err.to_string(), "segmentIndex 1 is out of range [0, 1)");
    }

    #[test]
    fn clear_all_sums_every_timeline() {
        let state = state(3);
        let ctx = CallContext::new(&state);
        create(&ctx, 0, 0.0, 1.0).unwrap();
        create(&ctx, 2, 0.0, 1.0).unwrap();
        create(&ctx, 2, 1.0, 2.0).unwrap();
        let cleared = clear_all_timelines(&ctx, NoParams {}).unwrap();
        assert_eq!(cleared.removed_count, 3);
        assert_eq!(cleared.timelines_cleared, 3);
    }

    #[test]
    fn list_returns_sorted_segments() {
        let state = state(1);
        let ctx = CallContext::new(&state);
        create(&ctx, 0, 5.0, 6.0).unwrap();
        create(&ctx, 0, 1.0, 2.0).unwrap();
        let list = list_segments(&ctx, TimelineParams { timeline_index: 0 }).unwrap();
        assert_eq!(list.count, 2);
        assert_eq!(list.segments[0].start_time(), 1.0);
    }

    #[derive(Debug, Clone)]
    enum Edit {
        Create { start: u16, len: u16, red: u8 },
        Modify { pick: usize, start: u16, len: u16, red: u8 },
        Delete { pick: usize },
    }

    // Quarter-second grid so every bound is exact.
    fn secs(quarters: u16) -> f64 {
        f64::from(quarters) * 0.25
    }

    fn edit() -> impl Strategy<Value = Edit> {
        prop_oneof![
            (0u16..200, 1u16..40, any::<u8>()).prop_map(|(start, len, red)| Edit::Create { start, len, red }),
            (any::<usize>(), 0u16..200, 1u16..40, any::<u8>())
                .prop_map(|(pick, start, len, red)| Edit::Modify { pick, start, len, red }),
            any::<usize>().prop_map(|pick| Edit::Delete { pick }),
        ]
    }

    fn segments(state: &AppState) -> Vec<Segment> {
        state.with_project(|p| p.timeline(0).map(|t| t.segments().to_vec()).unwrap_or_default())
    }

    /// The written segment is the only one touching `[start, end)`.
    fn assert_covers(state: &AppState, change: &SegmentChange, start: f64, end: f64, color: Color) -> Result<(), TestCaseError> {
        let segments = segments(state);
        let touching: Vec<&Segment> = segments
            .iter()
            .filter(|s| s.start_time() < end && s.end_time() > start)
            .collect();
        prop_assert_eq!(touching.len(), 1);
        prop_assert_eq!((touching[0].start_time(), touching[0].end_time()), (start, end));
        prop_assert_eq!(touching[0].color, color);
        let at_index = &segments[change.segment_index];
        prop_assert_eq!((at_index.start_time(), at_index.end_time()), (start, end));
        Ok(())
    }

    proptest! {
        #[test]
        fn random_edits_keep_the_timeline_consistent(edits in proptest::collection::vec(edit(), 1..40)) {
            let state = state(1);
            let ctx = CallContext::new(&state);
            for edit in edits {
                let len = segments(&state).len();
                match edit {
                    Edit::Create { start, len: span, red } => {
                        let (s, e) = (secs(start), secs(start + span));
                        let change = create_segment(
                            &ctx,
                            CreateSegmentParams {
                                timeline_index: 0,
                                start_time: s,
                                end_time: e,
                                color: ColorArg(json!([red, 0, 0])),
                                pixel_count: None,
                            },
                        )
                        .unwrap();
                        assert_covers(&state, &change, s, e, Color::rgb(red, 0, 0))?;
                    }
                    Edit::Modify { pick, start, len: span, red } if len > 0 => {
                        let (s, e) = (secs(start), secs(start + span));
                        let change = modify_segment(
                            &ctx,
                            ModifySegmentParams {
                                timeline_index: 0,
                                segment_index: i64::try_from(pick % len).unwrap(),
                                start_time: Some(s),
                                end_time: Some(e),
                                color: Some(ColorArg(json!([red, 0, 0]))),
                                pixel_count: None,
                            },
                        )
                        .unwrap();
                        assert_covers(&state, &change, s, e, Color::rgb(red, 0, 0))?;
                    }
                    Edit::Delete { pick } if len > 0 => {
                        let deleted = delete_segment(
                            &ctx,
                            SegmentRefParams {
                                timeline_index: 0,
                                segment_index: i64::try_from(pick % len).unwrap(),
                            },
                        )
                        .unwrap();
                        prop_assert_eq!(deleted.remaining, len - 1);
                    }
                    Edit::Modify { .. } | Edit::Delete { .. } => {}
                }
                prop_assert!(state.with_project(|p| p.timeline(0).unwrap().is_consistent()));
            }
        }
    }
}

use crate::timeline::convert::OverlapTimeline;
use crate::timeline::manifest::TimelineElement;

/// What the background layer shows at one instant.
#[derive(Clone, Debug, PartialEq)]
pub enum FrameState<'a> {
    /// Before the first segment starts.
    Idle,
    Element(&'a TimelineElement),
    Transition {
        from: &'a TimelineElement,
        to: &'a TimelineElement,
        /// Position inside the overlap window, in `[0, 1]`.
        progress: f32,
        /// Transition recorded for this pair, if any.
        transition: Option<&'a str>,
    },
    /// No segment covers this time.
    Gap,
}

impl FrameState<'_> {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Element(_) => "element",
            Self::Transition { .. } => "transition",
            Self::Gap => "gap",
        }
    }
}

/// Overlap window `[max(start), min(end)]` of two segments, if non-empty.
fn overlap(a: &TimelineElement, b: &TimelineElement) -> Option<(f64, f64)> {
    let start = a.start.max(b.start);
    let end = a.end.min(b.end);
    (start < end).then_some((start, end))
}

impl OverlapTimeline {
    /// Resolve time `t` (seconds) to a render state.
    ///
    /// Adjacent segment pairs are scanned in start order and the first overlap window holding
    /// `t` (inclusive on both ends) wins. Outside every window the segment containing `t`
    /// renders plainly.
    pub fn state_at(&self, t: f64) -> FrameState<'_> {
        let elements = self.elements();
        for pair in elements.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            let Some((start, end)) = overlap(a, b) else {
                continue;
            };
            if start <= t && t <= end {
                let progress = ((t - start) / (end - start)).clamp(0.0, 1.0) as f32;
                return FrameState::Transition {
                    from: a,
                    to: b,
                    progress,
                    transition: self.transition_for(&a.id, &b.id),
                };
            }
        }
        if let Some(el) = elements.iter().find(|e| e.contains(t)) {
            return FrameState::Element(el);
        }
        match elements.first() {
            Some(first) if t < first.start => FrameState::Idle,
            None => FrameState::Idle,
            Some(_) => FrameState::Gap,
        }
    }
}

/// The foreground clip covering `t`, if any. Clips are checked in start order.
pub fn active_clip(clips: &[TimelineElement], t: f64) -> Option<&TimelineElement> {
    clips.iter().find(|c| c.contains(t))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::manifest::ElementKind;

    fn timeline() -> OverlapTimeline {
        OverlapTimeline::from_sequential(&[
            TimelineElement::new("a", ElementKind::Shader, 1.0, 5.0),
            TimelineElement::new("t", ElementKind::Transition, 5.0, 6.6).with_name("T"),
            TimelineElement::new("b", ElementKind::Shader, 6.6, 12.0),
            TimelineElement::new("c", ElementKind::Shader, 14.0, 15.0),
        ])
    }

    #[test]
    fn overlap_dispatches_a_transition() {
        let tl = timeline();
        match tl.state_at(6.0) {
            FrameState::Transition {
                from,
                to,
                progress,
                transition,
            } => {
                assert_eq!(from.id, "a");
                assert_eq!(to.id, "b");
                assert!((progress - 0.625).abs() < 1e-5, "{progress}");
                assert_eq!(transition, Some("T"));
            }
            other => panic!("expected a transition, got {other:?}"),
        }
    }

    #[test]
    fn window_edges_are_inclusive() {
        let tl = timeline();
        assert!(matches!(tl.state_at(5.0), FrameState::Transition { progress, .. } if progress == 0.0));
        assert!(matches!(tl.state_at(6.6), FrameState::Transition { progress, .. } if progress == 1.0));
    }

    #[test]
    fn plain_idle_and_gap_states() {
        let tl = timeline();
        assert_eq!(tl.state_at(0.5), FrameState::Idle);
        assert!(matches!(tl.state_at(2.0), FrameState::Element(e) if e.id == "a"));
        assert!(matches!(tl.state_at(8.0), FrameState::Element(e) if e.id == "b"));
        assert_eq!(tl.state_at(13.0), FrameState::Gap);
        assert!(matches!(tl.state_at(14.5), FrameState::Element(e) if e.id == "c"));
        assert_eq!(tl.state_at(15.0), FrameState::Gap);
        assert_eq!(OverlapTimeline::default().state_at(1.0), FrameState::Idle);
    }

    #[test]
    fn foreground_clips_use_half_open_intervals() {
        let clips = [
            TimelineElement::new("v1", ElementKind::Video, 0.0, 2.0),
            TimelineElement::new("v2", ElementKind::Video, 2.0, 3.0),
        ];
        assert_eq!(active_clip(&clips, 2.0).map(|c| c.id.as_str()), Some("v2"));
        assert_eq!(active_clip(&clips, 3.0), None);
    }
}

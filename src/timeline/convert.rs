use std::collections::{BTreeMap, BTreeSet};

use crate::timeline::manifest::{ElementKind, TimelineElement};

/// Boundary times closer than this are treated as touching.
const TOUCH_EPSILON: f64 = 1e-6;

fn touches(a: f64, b: f64) -> bool {
    (a - b).abs() <= TOUCH_EPSILON
}

/// Ordered pair of adjacent shader segments. `to` is `None` for the last segment.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SegmentPair {
    pub from: String,
    pub to: Option<String>,
}

/// Shader segments in overlapping form: a transition is the overlap of two adjacent segments.
#[derive(Clone, Debug, Default)]
pub struct OverlapTimeline {
    /// Shader segments sorted by start time.
    elements: Vec<TimelineElement>,
    transitions: BTreeMap<SegmentPair, String>,
}

impl OverlapTimeline {
    /// Rewrite a sequential shader/transition track into overlapping shader segments.
    ///
    /// A shader that ends where a transition starts is extended to the transition's end, and
    /// the pair (shader, following shader) is mapped to that transition's name. A shader that
    /// starts where a transition ends is extended back to the transition's start. Transition
    /// elements are dropped from the result; video elements are ignored.
    pub fn from_sequential(elements: &[TimelineElement]) -> Self {
        let mut shaders: Vec<&TimelineElement> = elements
            .iter()
            .filter(|e| e.kind == ElementKind::Shader)
            .collect();
        shaders.sort_by(|a, b| a.start.total_cmp(&b.start));
        let transitions: Vec<&TimelineElement> = elements
            .iter()
            .filter(|e| e.kind == ElementKind::Transition)
            .collect();

        let mut out = Self::default();
        for (i, shader) in shaders.iter().enumerate() {
            let mut seg = (*shader).clone();
            if let Some(after) = transitions.iter().find(|t| touches(t.start, shader.end)) {
                seg.end = after.end;
                let pair = SegmentPair {
                    from: shader.id.clone(),
                    to: shaders.get(i + 1).map(|next| next.id.clone()),
                };
                tracing::debug!(
                    shader = %shader.name,
                    end = seg.end,
                    transition = %after.name,
                    "extended shader into transition"
                );
                out.transitions.insert(pair, after.name.clone());
            }
            if let Some(before) = transitions.iter().find(|t| touches(t.end, shader.start)) {
                seg.start = before.start;
                tracing::debug!(shader = %shader.name, start = seg.start, "extended shader back over transition");
            }
            out.elements.push(seg);
        }
        out.elements.sort_by(|a, b| a.start.total_cmp(&b.start));
        tracing::info!(
            input = elements.len(),
            segments = out.elements.len(),
            transitions = out.transitions.len(),
            "converted timeline to overlapping segments"
        );
        out
    }

    pub fn elements(&self) -> &[TimelineElement] {
        &self.elements
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Transition recorded for the overlap of `from` followed by `to`.
    pub fn transition_for(&self, from: &str, to: &str) -> Option<&str> {
        self.transitions
            .get(&SegmentPair {
                from: from.to_string(),
                to: Some(to.to_string()),
            })
            .map(String::as_str)
    }

    /// Every distinct transition name the timeline refers to.
    pub fn transition_names(&self) -> BTreeSet<&str> {
        self.transitions.values().map(String::as_str).collect()
    }

    pub fn pairs(&self) -> impl Iterator<Item = (&SegmentPair, &str)> {
        self.transitions.iter().map(|(k, v)| (k, v.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn atb() -> Vec<TimelineElement> {
        vec![
            TimelineElement::new("a", ElementKind::Shader, 0.0, 5.0),
            TimelineElement::new("t", ElementKind::Transition, 5.0, 6.6).with_name("T"),
            TimelineElement::new("b", ElementKind::Shader, 6.6, 12.0),
        ]
    }

    #[test]
    fn transitions_become_overlaps() {
        let tl = OverlapTimeline::from_sequential(&atb());
        let spans: Vec<_> = tl
            .elements()
            .iter()
            .map(|e| (e.id.as_str(), e.start, e.end))
            .collect();
        assert_eq!(spans, [("a", 0.0, 6.6), ("b", 5.0, 12.0)]);
        assert_eq!(tl.transition_for("a", "b"), Some("T"));
        assert_eq!(tl.transition_for("b", "a"), None);
        assert_eq!(tl.transition_names().into_iter().collect::<Vec<_>>(), ["T"]);
    }

    #[test]
    fn trailing_transition_maps_to_end() {
        let els = vec![
            TimelineElement::new("a", ElementKind::Shader, 0.0, 4.0),
            TimelineElement::new("t", ElementKind::Transition, 4.0, 5.0).with_name("fade"),
        ];
        let tl = OverlapTimeline::from_sequential(&els);
        assert_eq!(tl.elements()[0].end, 5.0);
        let (pair, name) = tl.pairs().next().unwrap();
        assert_eq!(pair.to, None);
        assert_eq!(name, "fade");
    }

    #[test]
    fn boundaries_match_within_epsilon_and_ignore_video() {
        let els = vec![
            TimelineElement::new("v", ElementKind::Video, 0.0, 9.0),
            TimelineElement::new("b", ElementKind::Shader, 3.2000000001, 8.0),
            TimelineElement::new("t", ElementKind::Transition, 2.2, 3.2).with_name("wipe"),
            TimelineElement::new("a", ElementKind::Shader, 0.0, 2.2),
        ];
        let tl = OverlapTimeline::from_sequential(&els);
        let ids: Vec<_> = tl.elements().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
        assert_eq!(tl.elements()[0].end, 3.2);
        assert_eq!(tl.elements()[1].start, 2.2);
        assert_eq!(tl.transition_for("a", "b"), Some("wipe"));
    }
}

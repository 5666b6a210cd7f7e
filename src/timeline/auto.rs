//! Sequential timelines generated by the selection policy for cycling renders.

use rand::Rng;

use crate::select::{ShaderCycler, TransitionCycler};
use crate::timeline::manifest::{ElementKind, TimelineElement};

/// Shortest and longest shader segment, in seconds.
pub const SEGMENT_SECONDS: (f64, f64) = (10.0, 25.0);

/// Transition name used when no scored transition is usable; it resolves to the cross-fade.
pub const CROSSFADE_NAME: &str = "crossfade";

/// Transition cycling inputs for [`plan_cycle`].
pub struct CycleTransitions<'a> {
    pub cycler: &'a mut TransitionCycler,
    /// Length of every transition segment, in seconds.
    pub duration: f64,
}

/// Build a sequential shader/transition track covering `[0, duration)`.
///
/// Each segment lasts `U[10, 25]` seconds. With transitions, the shader plays alone for the
/// segment length minus the transition duration and a transition to the next shader fills the
/// rest. Shader elements are named after the shader; ids are `s0, s1, ..` and `t0, t1, ..`.
pub fn plan_cycle(
    duration: f64,
    shaders: &mut ShaderCycler,
    mut transitions: Option<CycleTransitions<'_>>,
    rng: &mut impl Rng,
) -> Vec<TimelineElement> {
    let mut elements = Vec::new();
    let mut cursor = 0.0;
    let mut current = shaders.first(rng);
    let mut index = 0usize;
    tracing::info!(shader = %current, "starting with shader");

    while cursor < duration {
        let length = rng.random_range(SEGMENT_SECONDS.0..=SEGMENT_SECONDS.1);
        let fade = transitions.as_ref().map_or(0.0, |t| t.duration.max(0.0));
        let pure_end = (cursor + (length - fade).max(0.0)).min(duration);

        elements.push(
            TimelineElement::new(format!("s{index}"), ElementKind::Shader, cursor, pure_end)
                .with_name(current.clone()),
        );
        if pure_end >= duration {
            break;
        }
        if fade > 0.0 && pure_end + fade >= duration {
            // No room for another shader after this transition; play the current one out.
            if let Some(last) = elements.last_mut() {
                last.end = duration;
            }
            break;
        }

        let next = shaders.next(rng);
        match transitions.as_mut() {
            Some(t) => {
                let name = t
                    .cycler
                    .next(rng)
                    .unwrap_or_else(|| CROSSFADE_NAME.to_string());
                let end = (pure_end + fade).min(duration);
                tracing::info!(
                    from = %current,
                    to = %next,
                    transition = %name,
                    at = pure_end,
                    "planned transition"
                );
                elements.push(
                    TimelineElement::new(format!("t{index}"), ElementKind::Transition, pure_end, end)
                        .with_name(name),
                );
                cursor = end;
            }
            None => {
                tracing::info!(from = %current, to = %next, at = pure_end, "planned switch");
                cursor = pure_end;
            }
        }
        current = next;
        index += 1;
    }
    elements
}

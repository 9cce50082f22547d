use hashbrown::HashMap;
use novacore::protocol::EntityState;
use std::collections::VecDeque;

/// Samples retained per remote entity.
pub const MAX_SAMPLES: usize = 3;

/// Render delay in ticks; two ticks keep a pair of samples bracketing the
/// render time at the nominal snapshot rate.
pub const INTERPOLATION_DELAY_TICKS: f32 = 2.0;

#[derive(Debug, Copy, Clone)]
struct Sample {
    tick: u32,
    x: f32,
    y: f32,
    velocity_x: f32,
    velocity_y: f32,
}

/// Renders remote entities a fixed delay behind the newest snapshot, linearly
/// interpolating between the two samples bracketing the render time. The
/// locally predicted entity never goes through here.
pub struct Interpolator {
    history: HashMap<u32, VecDeque<Sample>>,
}

impl Interpolator {
    pub fn new() -> Interpolator {
        Interpolator {
            history: HashMap::new(),
        }
    }

    /// Feed one snapshot. `local_entity` is skipped; prediction owns it.
    pub fn record_snapshot(
        &mut self,
        server_tick: u32,
        entities: &[EntityState],
        local_entity: Option<u32>,
    ) {
        for state in entities {
            if Some(state.entity_id) == local_entity {
                continue;
            }

            let samples = self
                .history
                .entry(state.entity_id)
                .or_insert_with(VecDeque::new);

            samples.push_back(Sample {
                tick: server_tick,
                x: state.position_x,
                y: state.position_y,
                velocity_x: state.velocity_x,
                velocity_y: state.velocity_y,
            });

            if samples.len() > MAX_SAMPLES {
                samples.pop_front();
            }
        }
    }

    /// Position of a remote entity at `current_tick - delay`. Falls back to
    /// the newest sample when no pair brackets the render time.
    pub fn position(&self, entity_id: u32, current_tick: f32) -> Option<(f32, f32)> {
        let samples = self.history.get(&entity_id)?;

        if samples.is_empty() {
            return None;
        }

        let render_tick = (current_tick - INTERPOLATION_DELAY_TICKS).max(0.0);

        for window in 0..samples.len().saturating_sub(1) {
            let from = &samples[window];
            let to = &samples[window + 1];

            if f32_from(from.tick) <= render_tick && render_tick <= f32_from(to.tick) {
                let span = f32_from(to.tick) - f32_from(from.tick);

                if span <= 0.0 {
                    return Some((from.x, from.y));
                }

                let t = ((render_tick - f32_from(from.tick)) / span).max(0.0).min(1.0);

                return Some((from.x + (to.x - from.x) * t, from.y + (to.y - from.y) * t));
            }
        }

        let newest = samples.back()?;
        Some((newest.x, newest.y))
    }

    /// Drop one entity's history, e.g. after its destroy event.
    pub fn forget(&mut self, entity_id: u32) {
        self.history.remove(&entity_id);
    }

    /// Drop everything; used on session change.
    pub fn clear(&mut self) {
        self.history.clear();
    }

    #[inline]
    pub fn tracked_entities(&self) -> usize {
        self.history.len()
    }
}

#[inline]
fn f32_from(tick: u32) -> f32 {
    tick as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use novacore::protocol::EntityKind;

    fn state(entity_id: u32, x: f32, y: f32) -> EntityState {
        EntityState {
            entity_id,
            position_x: x,
            position_y: y,
            velocity_x: 0.0,
            velocity_y: 0.0,
            health: 100,
            flags: 0,
            kind: EntityKind::Enemy,
        }
    }

    #[test]
    fn test_bracketed_render_time_interpolates() {
        let mut interpolator = Interpolator::new();

        interpolator.record_snapshot(10, &[state(5, 100.0, 0.0)], None);
        interpolator.record_snapshot(11, &[state(5, 110.0, 0.0)], None);
        interpolator.record_snapshot(12, &[state(5, 120.0, 0.0)], None);

        // Render time 12.5 - 2 = 10.5, halfway between ticks 10 and 11.
        let (x, y) = interpolator.position(5, 12.5).unwrap();

        assert!((x - 105.0).abs() < 1e-3);
        assert_eq!(y, 0.0);
    }

    #[test]
    fn test_unbracketed_falls_back_to_newest() {
        let mut interpolator = Interpolator::new();

        interpolator.record_snapshot(10, &[state(5, 100.0, 0.0)], None);
        interpolator.record_snapshot(11, &[state(5, 110.0, 0.0)], None);

        // Render time far beyond the newest sample.
        let (x, _) = interpolator.position(5, 50.0).unwrap();

        assert_eq!(x, 110.0);
    }

    #[test]
    fn test_history_caps_at_three_samples() {
        let mut interpolator = Interpolator::new();

        for tick in 0..10 {
            interpolator.record_snapshot(tick, &[state(5, tick as f32, 0.0)], None);
        }

        // Render time inside the dropped window falls back rather than
        // interpolating from evicted samples.
        let samples = &interpolator.history[&5];
        assert_eq!(samples.len(), MAX_SAMPLES);
        assert_eq!(samples.front().unwrap().tick, 7);
    }

    #[test]
    fn test_local_entity_skipped() {
        let mut interpolator = Interpolator::new();

        interpolator.record_snapshot(1, &[state(5, 0.0, 0.0), state(9, 1.0, 1.0)], Some(9));

        assert!(interpolator.position(5, 10.0).is_some());
        assert!(interpolator.position(9, 10.0).is_none());
    }

    #[test]
    fn test_forget_and_clear() {
        let mut interpolator = Interpolator::new();

        interpolator.record_snapshot(1, &[state(5, 0.0, 0.0), state(6, 0.0, 0.0)], None);

        interpolator.forget(5);
        assert!(interpolator.position(5, 10.0).is_none());
        assert_eq!(interpolator.tracked_entities(), 1);

        interpolator.clear();
        assert_eq!(interpolator.tracked_entities(), 0);
    }

    #[test]
    fn test_unknown_entity() {
        let interpolator = Interpolator::new();

        assert!(interpolator.position(42, 10.0).is_none());
    }
}

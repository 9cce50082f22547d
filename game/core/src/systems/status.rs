use crate::components::{Enemy, GameState, Player, WaveController};
use hadron::prelude::{System, World};

/// Watches for the end of the game. Defeat once no player entity is left.
/// Victory in a shooter world once its wave plan is exhausted and the field
/// is clear; in a world with no wave plan (the blob arena) once a single
/// player stands.
pub struct StatusSystem;

impl System for StatusSystem {
    fn name(&self) -> &'static str {
        "status"
    }

    fn update(&mut self, world: &mut World, _dt: f32) {
        let players_alive = world.view::<Player>().len();
        let enemies_alive = world.view::<Enemy>().len();

        let controller = world
            .view::<WaveController>()
            .iter()
            .next()
            .map(|(_, controller)| *controller);

        let mut states = world.view_mut::<GameState>();
        let state = match states.iter_mut().next() {
            Some((_, state)) => state,
            None => return,
        };

        if state.over {
            return;
        }

        if players_alive == 0 {
            state.over = true;
            state.victory = false;
            return;
        }

        match controller {
            Some(controller) => {
                let waves_done =
                    !controller.wave_active && controller.current_wave >= controller.total_waves;

                if waves_done && enemies_alive == 0 {
                    state.over = true;
                    state.victory = true;
                }
            }
            None => {
                if players_alive == 1 {
                    state.over = true;
                    state.victory = true;
                }
            }
        }
    }
}

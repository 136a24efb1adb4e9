use bevy_ecs::prelude::Resource;

/// Simulation clock.
///
/// `tick` counts completed simulation ticks; `elapsed` and `delta` are in
/// seconds of simulated time.
#[derive(Resource, Clone, Copy, Debug)]
pub struct WorldTime {
    pub elapsed: f32,
    pub delta: f32,
    pub tick: u64,
}

impl Default for WorldTime {
    fn default() -> Self {
        WorldTime {
            elapsed: 0.0,
            delta: 1.0 / 30.0,
            tick: 0,
        }
    }
}

impl WorldTime {
    pub fn advance(&mut self) {
        self.elapsed += self.delta;
        self.tick += 1;
    }
}

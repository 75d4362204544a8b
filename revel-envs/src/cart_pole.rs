use rand::{Rng, SeedableRng, rngs::StdRng};
use revel_core::env::{Env, EnvDescription, Space, Step};
use revel_core::numeric::Frame;

const GRAVITY: f32 = 9.8;
const CART_MASS: f32 = 1.0;
const POLE_MASS: f32 = 0.1;
const POLE_HALF_LENGTH: f32 = 0.5;
const FORCE_MAG: f32 = 10.0;
const TAU: f32 = 0.02;
const X_THRESHOLD: f32 = 2.4;
const THETA_THRESHOLD: f32 = 12.0 * std::f32::consts::PI / 180.0;
const MAX_EPISODE_STEPS: usize = 500;

/// The classic pole balancing control problem. A pole is attached to a
/// cart moving on a frictionless track; pushing the cart left or right
/// keeps the pole from falling over. Reward is 1 per step until the pole
/// tips past 12 degrees or the cart leaves the track.
pub struct CartPole {
    x: f32,
    x_dot: f32,
    theta: f32,
    theta_dot: f32,
    steps: usize,
}

impl CartPole {
    pub fn new() -> Self {
        Self {
            x: 0.,
            x_dot: 0.,
            theta: 0.,
            theta_dot: 0.,
            steps: 0,
        }
    }

    fn observation(&self) -> Frame {
        Frame::new(vec![self.x, self.x_dot, self.theta, self.theta_dot], vec![4])
    }

    fn failed(&self) -> bool {
        self.x.abs() > X_THRESHOLD || self.theta.abs() > THETA_THRESHOLD
    }
}

impl Default for CartPole {
    fn default() -> Self {
        Self::new()
    }
}

impl Env for CartPole {
    fn reset(&mut self, seed: u64) -> Frame {
        let mut rng = StdRng::seed_from_u64(seed);
        self.x = rng.random_range(-0.05..0.05);
        self.x_dot = rng.random_range(-0.05..0.05);
        self.theta = rng.random_range(-0.05..0.05);
        self.theta_dot = rng.random_range(-0.05..0.05);
        self.steps = 0;
        self.observation()
    }

    fn step(&mut self, action: usize) -> Step {
        let force = if action == 1 { FORCE_MAG } else { -FORCE_MAG };
        let total_mass = CART_MASS + POLE_MASS;
        let pole_mass_length = POLE_MASS * POLE_HALF_LENGTH;
        let cos_theta = self.theta.cos();
        let sin_theta = self.theta.sin();

        let temp =
            (force + pole_mass_length * self.theta_dot * self.theta_dot * sin_theta) / total_mass;
        let theta_acc = (GRAVITY * sin_theta - cos_theta * temp)
            / (POLE_HALF_LENGTH * (4.0 / 3.0 - POLE_MASS * cos_theta * cos_theta / total_mass));
        let x_acc = temp - pole_mass_length * theta_acc * cos_theta / total_mass;

        // explicit Euler with a fixed timestep
        self.x += TAU * self.x_dot;
        self.x_dot += TAU * x_acc;
        self.theta += TAU * self.theta_dot;
        self.theta_dot += TAU * theta_acc;
        self.steps += 1;

        Step {
            observation: self.observation(),
            reward: 1.,
            terminated: self.failed(),
            truncated: self.steps >= MAX_EPISODE_STEPS,
        }
    }

    fn description(&self) -> EnvDescription {
        EnvDescription::new(
            Space::box_from_dims(vec![4]),
            Space::Discrete(2),
        )
    }
}

use rand::{Rng, SeedableRng, rngs::StdRng};
use revel_core::env::{Env, EnvDescription, Space, Step};
use revel_core::numeric::Frame;

const SIZE: usize = 3;
const MAX_EPISODE_STEPS: usize = 16;

const EMPTY: f32 = 0.0;
const OBSTACLE: f32 = 0.25;
const GOAL: f32 = 0.5;
const BALL: f32 = 1.0;

/// A tiny grid world with an image-like observation, handy as a cheap
/// stand-in for pixel environments. The ball moves on a 3x3 board around
/// a fixed center obstacle towards a goal cell. Reaching the goal pays 10
/// and ends the episode; wandering for too long truncates it.
pub struct Ballgame {
    ball: (usize, usize),
    goal: (usize, usize),
    steps: usize,
}

impl Ballgame {
    pub fn new() -> Self {
        Self {
            ball: (0, 0),
            goal: (SIZE - 1, SIZE - 1),
            steps: 0,
        }
    }

    fn obstacle() -> (usize, usize) {
        (SIZE / 2, SIZE / 2)
    }

    fn observation(&self) -> Frame {
        let mut data = vec![EMPTY; SIZE * SIZE];
        let at = |(row, col): (usize, usize)| row * SIZE + col;
        data[at(Self::obstacle())] = OBSTACLE;
        data[at(self.goal)] = GOAL;
        data[at(self.ball)] = BALL;
        Frame::new(data, vec![SIZE, SIZE, 1])
    }

    fn random_free_cell(rng: &mut StdRng, taken: &[(usize, usize)]) -> (usize, usize) {
        loop {
            let cell = (rng.random_range(0..SIZE), rng.random_range(0..SIZE));
            if cell != Self::obstacle() && !taken.contains(&cell) {
                return cell;
            }
        }
    }
}

impl Default for Ballgame {
    fn default() -> Self {
        Self::new()
    }
}

impl Env for Ballgame {
    fn reset(&mut self, seed: u64) -> Frame {
        let mut rng = StdRng::seed_from_u64(seed);
        self.goal = Self::random_free_cell(&mut rng, &[]);
        self.ball = Self::random_free_cell(&mut rng, &[self.goal]);
        self.steps = 0;
        self.observation()
    }

    fn step(&mut self, action: usize) -> Step {
        let (row, col) = self.ball;
        let target = match action {
            0 => (row.wrapping_sub(1), col),
            1 => (row + 1, col),
            2 => (row, col.wrapping_sub(1)),
            _ => (row, col + 1),
        };
        // moves off the board or into the obstacle leave the ball in place
        if target.0 < SIZE && target.1 < SIZE && target != Self::obstacle() {
            self.ball = target;
        }
        self.steps += 1;
        let terminated = self.ball == self.goal;
        Step {
            reward: if terminated { 10. } else { 0. },
            observation: self.observation(),
            terminated,
            truncated: self.steps >= MAX_EPISODE_STEPS,
        }
    }

    fn description(&self) -> EnvDescription {
        EnvDescription::new(
            Space::Box {
                low: 0.,
                high: 1.,
                shape: vec![SIZE, SIZE, 1],
            },
            Space::Discrete(4),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observation_marks_every_piece() {
        let mut env = Ballgame::new();
        let observation = env.reset(5);
        assert_eq!(observation.shape(), &[3, 3, 1]);
        let data = observation.data();
        assert_eq!(data.iter().filter(|&&v| v == BALL).count(), 1);
        assert_eq!(data.iter().filter(|&&v| v == GOAL).count(), 1);
        assert_eq!(data[4], OBSTACLE);
    }

    #[test]
    fn reaching_the_goal_terminates_with_reward() {
        let mut env = Ballgame::new();
        env.reset(0);
        env.ball = (0, 0);
        env.goal = (0, 1);
        let step = env.step(3);
        assert!(step.terminated);
        assert_eq!(step.reward, 10.);
    }

    #[test]
    fn walls_and_the_obstacle_block_movement() {
        let mut env = Ballgame::new();
        env.reset(0);
        env.ball = (0, 0);
        env.goal = (2, 2);
        let step = env.step(0);
        assert!(!step.terminated);
        assert_eq!(env.ball, (0, 0));
        env.ball = (0, 1);
        env.step(1);
        assert_eq!(env.ball, (0, 1));
    }

    #[test]
    fn wandering_truncates_after_the_step_limit() {
        let mut env = Ballgame::new();
        env.reset(0);
        env.ball = (0, 0);
        env.goal = (2, 2);
        for turn in 0..MAX_EPISODE_STEPS {
            env.ball = (0, 0);
            let step = env.step(0);
            assert_eq!(step.truncated, turn == MAX_EPISODE_STEPS - 1);
        }
    }
}

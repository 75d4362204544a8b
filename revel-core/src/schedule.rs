use enum_dispatch::enum_dispatch;

/// A scalar hyperparameter interpolated over training progress.
/// `progress` runs from 0 at the first frame to 1 at `total_frames`.
#[enum_dispatch]
pub trait Schedule {
    fn value(&self, progress: f64) -> f64;
}

#[derive(Debug, Clone, Copy)]
pub struct ConstantSchedule {
    value: f64,
}

impl ConstantSchedule {
    pub fn new(value: f64) -> Self {
        Self { value }
    }
}

impl Schedule for ConstantSchedule {
    fn value(&self, _progress: f64) -> f64 {
        self.value
    }
}

/// Linear ramp from `initial_value` to `final_value` over the first
/// `end_of_interpolation` fraction of training, flat afterwards.
#[derive(Debug, Clone, Copy)]
pub struct LinearAndConstantSchedule {
    initial_value: f64,
    final_value: f64,
    end_of_interpolation: f64,
}

impl LinearAndConstantSchedule {
    pub fn new(initial_value: f64, final_value: f64, end_of_interpolation: f64) -> Self {
        assert!(end_of_interpolation > 0.);
        Self {
            initial_value,
            final_value,
            end_of_interpolation,
        }
    }
}

impl Schedule for LinearAndConstantSchedule {
    fn value(&self, progress: f64) -> f64 {
        if progress >= self.end_of_interpolation {
            return self.final_value;
        }
        let coefficient = progress / self.end_of_interpolation;
        self.initial_value + (self.final_value - self.initial_value) * coefficient
    }
}

#[enum_dispatch(Schedule)]
#[derive(Debug, Clone, Copy)]
pub enum ScheduleKind {
    Constant(ConstantSchedule),
    LinearAndConstant(LinearAndConstantSchedule),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_schedule_ignores_progress() {
        let schedule = ConstantSchedule::new(0.1);
        assert_eq!(schedule.value(0.), 0.1);
        assert_eq!(schedule.value(0.7), 0.1);
        assert_eq!(schedule.value(1.), 0.1);
    }

    #[test]
    fn linear_and_constant_interpolates_then_holds() {
        let schedule = LinearAndConstantSchedule::new(1.0, 0.1, 0.1);
        assert!((schedule.value(0.) - 1.0).abs() < 1e-9);
        assert!((schedule.value(0.05) - 0.55).abs() < 1e-9);
        assert!((schedule.value(0.1) - 0.1).abs() < 1e-9);
        assert!((schedule.value(0.9) - 0.1).abs() < 1e-9);
    }

    #[test]
    fn schedule_kind_dispatches() {
        let schedule = ScheduleKind::from(LinearAndConstantSchedule::new(0.5, 0.0, 1.0));
        assert!((schedule.value(0.5) - 0.25).abs() < 1e-9);
    }
}

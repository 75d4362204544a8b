pub mod buffer;
pub mod distribution;
pub mod env;
pub mod model;
pub mod numeric;
pub mod optim;
pub mod reinforcer;
pub mod roller;
pub mod schedule;

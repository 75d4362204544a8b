pub mod actor_critic;
pub mod backbone;
pub mod q_model;

pub use actor_critic::ActorCritic;
pub use backbone::{Backbone, BackboneSpec, NATURE_CNN_MIN_INPUT, build_sequential};
pub use q_model::QModel;

pub mod ballgame;
pub mod cart_pole;

pub use ballgame::Ballgame;
pub use cart_pole::CartPole;

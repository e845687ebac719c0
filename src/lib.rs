pub mod engine;
pub mod mentions;
pub mod model;
pub mod sciwheel;
pub mod slack;
pub mod state;

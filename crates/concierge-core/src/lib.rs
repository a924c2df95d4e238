pub mod actions;
pub mod classifier;
pub mod config;
pub mod disambiguation;
pub mod persistence;
pub mod reducer;
pub mod state;
pub mod store;

pub use actions::*;
pub use reducer::*;
pub use state::*;

pub use persistence::*;

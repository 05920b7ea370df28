mod binding;
mod state;

pub use binding::*;
pub use state::*;

mod local;
mod remote;

pub use local::*;
pub use remote::*;

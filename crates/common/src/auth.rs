mod context;
mod gate;

pub use context::*;
pub use gate::*;

mod device;
mod identity;
mod pagination;
mod result;

pub use device::*;
pub use identity::*;
pub use pagination::*;
pub use result::*;

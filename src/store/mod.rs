pub mod kubernetes;
pub mod memory;
pub mod traits;

pub use kubernetes::*;
pub use memory::*;
pub use traits::*;

pub mod instance;
pub mod osb;
pub mod template;

pub use instance::*;
pub use osb::*;
pub use template::*;

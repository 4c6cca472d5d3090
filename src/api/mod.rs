pub mod extract;
pub mod handlers;
pub mod routes;

pub use extract::BrokerJson;
pub use handlers::*;
pub use routes::*;

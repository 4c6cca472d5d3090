pub mod binding;
pub mod catalog;
pub mod lifecycle;
pub mod parameters;

pub use binding::{resolve_binding, service_endpoints, ENDPOINTS_KEY};
pub use catalog::{build_catalog, make_service};
pub use lifecycle::{instance_name, InstanceLifecycle};
pub use parameters::{merge_parameters, resolve_plan};

//! A GraphQL gateway that forwards every Product and Variant operation to one upstream
//! GraphQL endpoint and relays the result.

pub mod axum_factory;
pub mod configuration;
pub mod error;
mod executable;
pub mod graphql;
pub mod schema;
pub mod upstream;

pub use crate::axum_factory::HttpServerHandle;
pub use crate::configuration::Configuration;
pub use crate::executable::Executable;
pub use crate::executable::main;
pub use crate::schema::GatewaySchema;
pub use crate::schema::build_schema;
pub use crate::upstream::Forwarder;
pub use crate::upstream::Variables;

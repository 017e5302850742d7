pub mod connection;
pub mod schema;
pub mod seed;

pub use connection::*;
pub use schema::*;
pub use seed::*;

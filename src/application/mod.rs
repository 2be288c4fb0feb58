pub mod registry;
pub mod servers;
pub mod session;
pub mod tools;

pub mod node;
pub mod session;

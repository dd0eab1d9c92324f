pub mod cli;
pub mod logical_path;
pub mod notify;
pub mod state;
pub mod validation;

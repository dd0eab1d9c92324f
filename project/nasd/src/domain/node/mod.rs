pub mod model;
pub mod repository;

pub use model::{DIRECTORY_SENTINEL, Node};
pub use repository::{NodeRepository, SqliteNodeRepository};

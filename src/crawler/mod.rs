pub mod bfs;
pub mod fetch;

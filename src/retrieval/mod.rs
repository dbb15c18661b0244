pub mod cache;
pub mod pipeline;
pub mod wordlist;

pub mod chunker;
pub mod coordinator;
pub mod extraction;

pub mod agent;
pub mod bridge;
pub mod context;
pub mod engine;
pub mod normalize;
pub mod stdio;
pub mod tooling;

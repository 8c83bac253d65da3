pub mod commands;
pub mod evaluator;
pub mod locks;
pub mod model;
pub mod store;

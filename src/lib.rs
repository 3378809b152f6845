pub mod evaluator;
pub mod game;
pub mod search;

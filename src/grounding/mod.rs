pub mod action;
pub mod compiler;
pub mod coords;
pub mod keys;
pub mod parser;

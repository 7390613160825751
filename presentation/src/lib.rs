pub mod cli;
pub mod clipboard;
pub mod render;
pub mod terminal;

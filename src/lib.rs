pub mod board;
pub mod cli;
pub mod config;
pub mod director;
pub mod game;
pub mod generation;
pub mod images;
pub mod profile;
pub mod server;
pub mod tasks;

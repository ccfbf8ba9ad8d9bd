pub mod backend;
pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod playlist;
pub mod presentation;
pub mod tasks {
    pub mod commands;
    pub mod controls;
    pub mod player;
}

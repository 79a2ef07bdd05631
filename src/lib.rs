pub mod action;
pub mod config;
pub mod forms;
pub mod mail;
pub mod maps;
pub mod model;
pub mod render;
pub mod server;
pub mod slack;
pub mod workflow;

pub mod bot;
pub mod config;
pub mod cooldown;
pub mod error;
pub mod gate;
pub mod health;
pub mod openrouter;
pub mod responder;

pub use bot::run;

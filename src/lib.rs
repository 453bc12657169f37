// sqlguard library - vets llm-written sql before it reaches the panther data lake

pub mod cli;
mod core;
mod error;
mod output;
mod server;

pub use crate::core::*;
pub use error::Error;
pub use output::Output;
pub use server::Server;

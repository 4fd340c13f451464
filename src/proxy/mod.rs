pub mod common;
pub mod handlers;
pub mod http_client;
pub mod mappers;
pub mod server;
pub mod token_manager;
pub mod tokenizer;
pub mod upstream;

pub use server::AppState;
pub use token_manager::TokenManager;

pub mod config;
pub mod document;
pub mod export;
pub mod import;
pub mod remote;
pub mod scanner;
pub mod shutdown;
pub mod snapshot;
pub mod terminal;

#[cfg(test)]
pub mod testing;

pub mod backend;
pub mod capture;
pub mod config;
pub mod harvest;
pub mod output;
pub mod resolver;
pub mod retry;
pub mod source;
pub mod table;

pub use tally_common as common;

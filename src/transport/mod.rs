pub mod errors;
pub mod types;

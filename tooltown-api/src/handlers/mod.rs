pub mod pdf;
pub mod tools;

pub mod bnb;
pub mod descent;
pub mod file;
pub mod matching;
pub mod problem;
pub mod solution;
pub mod utils;

pub mod ratios;
pub mod scenario;

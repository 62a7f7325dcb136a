pub mod oscillators;
pub mod synthesis;
pub mod tables;

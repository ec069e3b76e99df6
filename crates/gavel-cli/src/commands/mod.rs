pub mod backup;
pub mod data;
pub mod prepare;

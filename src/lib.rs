pub mod batch;
pub mod config;
pub mod derive;
pub mod hist;
pub mod matrix;
pub mod naming;
pub mod table;

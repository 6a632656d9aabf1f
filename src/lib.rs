pub mod config;
pub mod embedding;
pub mod error;
pub mod io;
pub mod knn;
pub mod model;

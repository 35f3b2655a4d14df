pub mod app;
pub mod config;
pub mod controllers;
pub mod error;
pub mod models;
pub mod paging;
pub mod repository;
pub mod state;
pub mod tmdb;

pub use error::{Error, RemoteFetchError};

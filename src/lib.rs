// src/lib.rs

//! booksync: incremental chapter sync from serialized-fiction sites to a remote library

pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;

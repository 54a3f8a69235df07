//! Library crate for quiz-clash-back, exposing modules for binaries and integration tests.

mod config;
pub mod dao;
mod dto;
mod error;
pub mod generator;
pub mod routes;
pub mod services;
pub mod state;

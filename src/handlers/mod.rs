// src/handlers/mod.rs

pub mod health;
pub mod rest;

pub use health::*;
pub use rest::*;

pub mod database;
pub mod error;
pub mod models;
pub mod services;
pub mod web;

#[cfg(test)]
pub mod testutil;

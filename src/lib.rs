//! Emergency medical loan service
//!
//! Risk scoring of emergency loan requests, loan confirmation, and final
//! approval against FIR and medical report documents.

pub mod audit;
pub mod config;
pub mod db;
pub mod deadline;
pub mod error;
pub mod geo;
pub mod handlers;
pub mod loan;
pub mod loan_service;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;

//! Clinic appointment booking.
//!
//! The lifecycle engine ([`lifecycle`], [`actions`]) is pure and shared by
//! both sides: the client-side [`reconcile::AppointmentBoard`] uses it to
//! build action menus and check server responses, and the HTTP
//! [`service::AppointmentService`] uses it to enforce the same rules before
//! anything is persisted.

pub mod actions;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod lifecycle;
pub mod middleware;
pub mod models;
pub mod reconcile;
pub mod routes;
pub mod service;
pub mod store;

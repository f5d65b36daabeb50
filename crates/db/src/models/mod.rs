//! Row models and insert DTOs.

pub mod audit;
pub mod dead_letter;
pub mod notification;
pub mod pending_email;
pub mod subscription;
pub mod user;

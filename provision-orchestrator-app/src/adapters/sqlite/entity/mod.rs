//! `SeaORM` entities.

pub mod call_record;
pub mod service;

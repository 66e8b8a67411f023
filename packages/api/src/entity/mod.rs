//! `SeaORM` entities for the scan history store

pub mod prelude;

pub mod scan;
pub mod user;

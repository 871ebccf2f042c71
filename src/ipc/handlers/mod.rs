pub mod backup_exchange;
pub mod classes;
pub mod compare;
pub mod core;
pub mod reports;
pub mod students;

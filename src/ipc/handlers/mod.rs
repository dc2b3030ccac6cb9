pub mod admissions;
pub mod core;
pub mod followups;
pub mod reports;
pub mod wizard;

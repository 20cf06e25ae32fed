pub mod adm;
pub mod config;

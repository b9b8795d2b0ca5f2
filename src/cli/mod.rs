//! Terminal front end: tables, progress bars and the setup command.

pub mod cache;
pub mod catalog;
pub mod refresh;
pub mod report;
pub mod setup;
pub mod ui;

pub mod app;
pub mod dashboard;
pub mod detail;
pub mod render;
pub mod run;

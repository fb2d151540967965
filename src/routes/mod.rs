pub mod connect;
pub mod dashboard;
pub mod health;
pub mod insights;
pub mod notes;
pub mod projects;
pub mod rounds;

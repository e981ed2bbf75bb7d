pub mod chat;
pub mod doctors;
pub mod health;
pub mod patients;

pub mod chatlog;
pub mod doctors;

pub use chatlog::{ChatLogEntry, ChatLogStore};
pub use doctors::{Doctor, DoctorStore, QuotaReceipt};

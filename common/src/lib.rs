pub mod errors;
pub mod notification;
pub mod protocol;
pub mod tokio;

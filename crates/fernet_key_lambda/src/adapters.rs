pub mod response_sender;
pub mod secret_store;

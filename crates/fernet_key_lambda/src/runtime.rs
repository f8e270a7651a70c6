pub use fernet_key_core::{config, contract, keygen, response};

//! AWS-oriented adapters and handlers for the Fernet key custom resource.
//!
//! This crate owns runtime integration details (the Lambda lifecycle handler,
//! the Secrets Manager write and the CloudFormation response callback) and
//! exposes a single runtime module boundary for contract, key generation and
//! response primitives.

pub mod adapters;
pub mod handlers;
pub mod runtime;

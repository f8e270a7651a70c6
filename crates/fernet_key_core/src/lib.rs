//! Domain primitives for the Fernet key custom resource.
//!
//! This crate owns the CloudFormation custom-resource contract, key generation,
//! response documents and configuration validation. It intentionally excludes
//! AWS SDK and Lambda runtime concerns.

pub mod config;
pub mod contract;
pub mod keygen;
pub mod response;

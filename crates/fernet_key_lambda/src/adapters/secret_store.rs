#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecretWriteReceipt {
    pub arn: Option<String>,
    pub version_id: Option<String>,
}

/// Overwrites the current value of an existing secret.
pub trait SecretStore {
    fn put_secret_value(&self, secret_id: &str, value: &str)
        -> Result<SecretWriteReceipt, String>;
}

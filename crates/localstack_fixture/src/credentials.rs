//! Placeholder credentials accepted by the emulator.

/// Access key id LocalStack accepts for every request.
pub const ACCESS_KEY_ID: &str = "test";

/// Secret access key LocalStack accepts for every request.
pub const SECRET_ACCESS_KEY: &str = "test";

/// Fixed credential pair for the emulated services.
///
/// These are not secrets. LocalStack ignores signature validity, but SDK
/// clients still need some credentials to sign requests with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Credentials {
    /// Access key id
    pub access_key_id: &'static str,
    /// Secret access key
    pub secret_access_key: &'static str,
}

impl Credentials {
    /// The placeholder pair used by every fixture.
    pub const fn localstack() -> Self {
        Self {
            access_key_id: ACCESS_KEY_ID,
            secret_access_key: SECRET_ACCESS_KEY,
        }
    }
}

impl Default for Credentials {
    fn default() -> Self {
        Self::localstack()
    }
}

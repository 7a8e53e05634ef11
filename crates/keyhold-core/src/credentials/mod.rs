//! Service credentials: storage, verification strategies and the
//! single-flight connection tester.

pub mod store;
pub mod tester;
pub mod verifiers;

pub use store::CredentialStore;
pub use tester::{ConnectionTester, DEFAULT_TEST_TIMEOUT};
pub use verifiers::{
    AzureOpenAiVerifier, GoogleDriveVerifier, OAuthClientVerifier, RemoteVerifier, SlackVerifier,
    Verifier, VerifierTable,
};

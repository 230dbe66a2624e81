//! Database module
//!
//! Credential model, secret sealing, repositories and the store facade.

pub mod cipher;
pub mod dynamodb;
pub mod models;
pub mod repositories;
pub mod store;

pub use cipher::{AesGcmCipher, CryptoError, EncryptedSecret, SecretCipher};
pub use dynamodb::DynamoDbClient;
pub use models::{
    Credential, CredentialPatch, CredentialStatus, CredentialView, LeaseRelease, NewCredential,
};
pub use repositories::{
    CredentialRepository, DynamoDbCredentialRepository, InMemoryCredentialRepository, StoreError,
};
pub use store::CredentialStore;

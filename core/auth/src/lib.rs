//! Credential acquisition for DriveMCP.
//!
//! Resolves a usable Google credential from, in order: the persisted
//! token record, an interactive installed-app flow, or a service-account
//! key. Live sessions hand out bearer tokens through [`TokenManager`],
//! which renews expired credentials on demand.

pub mod credential;
pub mod interactive;
pub mod oauth;
pub mod resolver;
pub mod service_account;
pub mod store;
pub mod token;

pub use credential::{
    AuthStrategy, ClientRegistration, CredentialRecord, CredentialState, DRIVE_READONLY_SCOPE,
};
pub use interactive::{InstalledAppFlow, LoopbackListener};
pub use oauth::{ClientSecrets, OAuthClient};
pub use resolver::{
    AuthSettings, AuthStrategyResolver, CredentialResolver, InteractiveAuthorizer,
    ServiceAccountAuthorizer, TokenRefresher,
};
pub use service_account::{ServiceAccountFlow, ServiceAccountKey};
pub use store::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use token::{AccessTokenSource, StaticToken, TokenManager};

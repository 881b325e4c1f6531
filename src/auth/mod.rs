//! # Credential Management
//!
//! Establishes and maintains the single gateway session of the process.
//!
//! - [`CredentialManager`] picks an access type (pinned or detected in the
//!   fixed order access key, AWS IAM, Azure AD, GCP, Kubernetes, Universal
//!   Identity) and produces an [`AuthSession`].
//! - [`spawn_refresh_loop`] keeps the session token valid in the background
//!   until its cancellation token fires or a refresh fails.
//! - [`cloud_id`] obtains the platform identity documents presented by the
//!   cloud mechanisms.

pub mod authenticator;
pub mod cloud_id;
pub mod manager;
pub mod refresh;
pub mod session;

pub use authenticator::{authenticator_for, rotate_uid_token, Authenticator};
pub use cloud_id::{CloudIdEndpoints, CloudIdError, CloudIdProvider, MetadataCloudIdProvider};
pub use manager::{CredentialManager, Established};
pub use refresh::{spawn_refresh_loop, RefreshExit, RefreshHandle, RefreshIntervals};
pub use session::{AuthSession, AuthToken};

#![doc = include_str!("../README.md")]

pub mod client;
pub mod config;
pub mod error;
pub mod server;
pub mod session;
pub mod transport;
pub mod types;

// Re-exports for convenient access
pub use client::IdentityClient;
pub use config::{ClientConfig, TotpConfig};
pub use error::{ApiError, Error};
pub use server::{IdentityServer, ServerConfig, ServerHooks};
pub use session::{MemoryStorage, SessionManager, TokenStorage};
pub use transport::{RetryPolicy, Transport};
pub use types::{
    AuthInput, DeviceInfo, DeviceStatusResponse, EidStatusResponse, EidVerifyInput,
    MachineEnrollmentResponse, MachineTokenResponse, OAuthParams, RegisterInput,
    RegisterResponse, SessionResponse, StrengthenInput, StrengthenMethod, TokenResponse,
    TotpLoginInput, TotpSetupResponse, TotpStatusResponse, TotpVerifyInput, UserContext,
    UserProfile, UserRole, DEFAULT_CONTEXT,
};

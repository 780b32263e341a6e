// CLA Whitelist - Core Library
// Agreements, addenda, membership reconciliation and the Gerrit whitelist check

pub mod error;
pub mod identity;
pub mod store;
pub mod addendum;
pub mod agreement;
pub mod membership;   // pure: addenda → active identities
pub mod whitelist;
#[cfg(feature = "server")]
pub mod server;       // axum endpoint queried by Gerrit

// Re-export commonly used types
pub use error::{ClaError, StoreError, ValidationError};
pub use identity::{Identity, IdentityKind};
pub use store::{
    DocumentStore, MemoryStore, SqliteStore, StoredDocument,
    Query, Filter, Direction, Subscription, subscribe,
};
pub use addendum::{Addendum, AddendumDocument, ADDENDUM_COLLECTION};
pub use agreement::{Agreement, AgreementDocument, AgreementFeed, AgreementType, AGREEMENT_COLLECTION};
pub use membership::{reconcile, ActiveSet};
pub use whitelist::{Guidance, VerificationStatus, WhitelistVerifier};
#[cfg(feature = "server")]
pub use server::{build_router, AppState, Credentials, ServiceConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

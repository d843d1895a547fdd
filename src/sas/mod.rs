//! Shared access signatures
//!
//! Minting of time-boxed, permission-scoped tokens for shares and files,
//! and decoding of tokens back into their signed fields.

pub mod builder;
pub mod permissions;
pub mod policy;

pub use builder::{build_token, SharedAccessSignature, SharedAccessSignatureBuilder, SIGNED_VERSION};
pub use permissions::SharedAccessPermissions;
pub use policy::{
    IpAddressOrRange, SasResource, SharedAccessHeaders, SharedAccessPolicy, SharedAccessProtocol,
};

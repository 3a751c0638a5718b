//! Request authentication.
//!
//! Unauthenticated access is capped at 50 requests per 24 hours. With a key
//! pair configured every request carries a fresh signature computed by
//! [`RequestSigner`] from the contents of a [`KeyStore`].

mod key_store;
mod signer;

pub use key_store::{KeyStore, PRIVATE_KEY_PATH_ENV, PUBLIC_KEY_ENV, PrivateKeySource};
pub use signer::{
    AuthMaterial, HmacSha256Scheme, NONCE_HEADER, PUBKEY_HEADER, RequestDescriptor, RequestSigner, SIG_HEADER,
    SIG_PREFIX, SignatureScheme,
};

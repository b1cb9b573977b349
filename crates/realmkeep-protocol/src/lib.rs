//! Request/response vocabulary for Realmkeep.
//!
//! This crate defines the "language" spoken between the account center,
//! a game-world instance, and whatever transport sits in front of them:
//!
//! - **Identity** ([`PlayerId`], [`AccountId`], [`WorldId`], [`LoginToken`])
//! - **Requests** ([`Request`]) and **responses** ([`Response`], [`NackCode`])
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how those shapes are
//!   converted to/from bytes.
//! - **Errors** ([`ProtocolError`]): what can go wrong during
//!   encoding/decoding.
//!
//! The protocol layer knows nothing about players being cached, online, or
//! persisted. Framing and transport are left to the caller.

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    AccountId, FriendEntry, LoginToken, MailAttachment, NackCode, PlayerId, Request,
    Response, WorldId,
};

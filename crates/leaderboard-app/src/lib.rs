//! Application layer of the bWAR leaderboard.
//!
//! This crate provides the pagination controller, the HTTP client and the
//! server-side listing service, configuration, and the contact relay shared
//! by the `serve` and `browse` commands.

pub mod config;
pub mod contact;
pub mod controller;
pub mod dataset;
pub mod listing_service;
pub mod logos;
pub mod remote;

// Re-exports for convenience
pub use config::{AppConfig, ClientConfig, ListingConfig, ListingsConfig, MailConfig, ServerConfig};
pub use contact::{
    ContactError, ContactForm, ContactService, FieldError, MailRelay, OutgoingMail, RelayError, SpoolRelay,
    SUCCESS_MESSAGE,
};
pub use controller::{LoadOutcome, PaginationController};
pub use dataset::Dataset;
pub use listing_service::{
    DocumentCollection, ListingError, ListingParams, ListingService, MemoryCollection, OrderedQuery,
};
pub use logos::{LogoSource, TeamLogoLoader};
pub use remote::{HttpRemote, PageRequest, PageResponse, RemoteError, RemoteListing};

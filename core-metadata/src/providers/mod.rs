//! External History Providers
//!
//! Clients for remote scrobbling services. Each provider turns the
//! service's paginated JSON into plain timestamps and candidates.

pub mod lastfm;

pub use lastfm::LastFmClient;

//! Peer connection handling: an outbound leecher [`session`] per connected
//! peer, and an inbound [`seeder`] serving other peers' requests.

pub(crate) mod seeder;
pub(crate) mod session;

pub(crate) use seeder::{SeedEntry, Seeder};
pub(crate) use session::PeerSession;

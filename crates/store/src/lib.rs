//! Durable state for the Tecnibot backend: conversation ID reservation,
//! the per-conversation record store with its write-through session cache,
//! image intake, and the ticket store.
//!
//! Everything here writes JSON files under the configured data root, always
//! through a sibling temp file + atomic rename.

pub mod cache;
pub mod conversations;
pub mod ids;
pub mod images;
pub mod tickets;

pub use cache::{ConversationRepo, SessionCache};
pub use conversations::ConversationStore;
pub use ids::IdReserver;
pub use images::{ImageIntake, StoredImage};
pub use tickets::{build_contact_url, TicketStore};

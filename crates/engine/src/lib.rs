//! Turfpoint Engine - Settlement, sessions, ownership, and progression

pub mod accounts;
pub mod external;
pub mod ownership;
pub mod progression;
pub mod session;
pub mod settlement;

#[cfg(test)]
mod test_support;

pub use accounts::AccountManager;
pub use ownership::OwnershipManager;
pub use progression::QuestTracker;
pub use session::VisitManager;
pub use settlement::SettlementEngine;

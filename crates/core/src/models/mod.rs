//! Data models for turfpoint entities

mod quest;
mod spot;
mod user;
mod visit;
mod wallet;
mod weekly;

pub use quest::*;
pub use spot::*;
pub use user::*;
pub use visit::*;
pub use wallet::*;
pub use weekly::*;

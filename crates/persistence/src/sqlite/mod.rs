//! SQLite database management

mod badges;
mod connection;
mod payments;
mod quests;
mod spots;
mod transactions;
mod users;
mod visits;
mod wallets;
mod weekly;

pub use badges::*;
pub use connection::Database;
pub use payments::*;
pub use quests::*;
pub use spots::*;
pub use transactions::*;
pub use users::*;
pub use visits::*;
pub use wallets::*;
pub use weekly::*;

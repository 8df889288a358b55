//! Session credential models shared by the store, coordinator, and executor.

pub mod pair;
pub mod secret;

pub use pair::*;
pub use secret::*;

pub mod gate;
pub mod manager;
pub mod session;
pub mod slot;

pub use gate::{authorize, require, Capability, Decision, DenyReason};
pub use manager::SessionManager;
pub use session::{Session, SessionData};
pub use slot::{open_slot, FileSlot, KeyringSlot, MemorySlot, SealedFileSlot, TokenSlot};

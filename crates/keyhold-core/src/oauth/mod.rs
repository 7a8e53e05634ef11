//! OAuth linking: pending states, code exchange and the link coordinator.

pub mod coordinator;
pub mod exchange;
pub mod state;

pub use coordinator::{LinkCallback, LinkCoordinator};
pub use exchange::{exchange_code_for_token, ClientRegistration, TokenGrant};
pub use state::{PendingLink, StateManager, STATE_EXPIRY_SECS};

pub mod identity;
pub mod state;

pub use identity::Identity;
pub use state::SessionState;

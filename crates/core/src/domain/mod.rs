pub mod change;
pub mod events;
pub mod factory;
pub mod mapped;
pub mod remote;
pub mod transmission;

// Re-exports
pub use change::*;
pub use events::*;
pub use factory::*;
pub use mapped::*;
pub use remote::*;
pub use transmission::*;

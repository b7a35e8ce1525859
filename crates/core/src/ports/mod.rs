pub mod session;
pub mod storage;
pub mod xattr;

// Re-exports
pub use session::*;
pub use storage::*;
pub use xattr::*;

// Declare the modules to re-export
#[cfg(feature = "streams")]
pub mod streams; // Periodic timestamp producer and subscriptions

// Re-export everything
#[cfg(feature = "streams")]
pub use streams::*;

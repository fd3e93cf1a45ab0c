// # Notification Sink Implementations
//
// In-process sinks shipped with the core. Sinks that talk to external
// services live in their own crates.

pub mod memory;

pub use memory::MemoryNotificationSink;

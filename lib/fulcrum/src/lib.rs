//! The fixed-rate tick loop, the parallel-safe system scheduler, and the
//! thread-local scratch arena that backs per-batch worker scratch memory.
//! Named for the pivot the game server's simulation turns on.

pub mod scheduler;
pub mod scratch;
pub mod tick_loop;

pub use scheduler::{AccessDescriptor, ComponentId, ParallelExecutor, Scheduler, System};
pub use scratch::{with_thread_arena, ScratchArena};
pub use tick_loop::{TickLoop, TickMetrics};

// Library root: the live draft engine (pick order, roster rules, atomic pick
// commits, autodraft queues, the per-room auto-pick timer, and the client-side
// latency/sync helpers) plus the store backends it runs against.

pub mod autopick;
pub mod clock;
pub mod commit;
pub mod engine;
pub mod error;
pub mod latency;
pub mod lifecycle;
pub mod model;
pub mod pick_order;
pub mod pool;
pub mod queue;
pub mod roster;
pub mod store;
pub mod sync;
pub mod timer;

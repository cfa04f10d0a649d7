//! # ATP Supervisor Library
//!
//! Cycle-driven onboard train protection. One `update(dt)` per control tick
//! runs four cooperating layers over a read-only snapshot of the track
//! ahead and produces a single brake/authorization decision plus the cab
//! display and sound intents:
//!
//! 1. **Vigilance** — driver activity supervision (timer pairs)
//! 2. **RSO** — signal-repetition reflex (acknowledge closed signals)
//! 3. **KVB** — beacon overspeed supervisor (targets + braking curves)
//! 4. **TVM** — continuous cab-signaling decoder (sequence reduction,
//!    table decode, COVIT enforcement)
//!
//! Layer order is fixed; a flag raised by an earlier layer is visible to
//! later layers the same cycle, never the reverse. Emergency sources are
//! OR-combined — the most restrictive decision always wins — and a rearm
//! input can only clear the combined flag once every source has released.

pub mod consts;
pub mod kvb;
pub mod outputs;
pub mod rso;
pub mod sim;
pub mod snapshot;
pub mod supervisor;
pub mod tvm;
pub mod vacma;

//! Falsification tests for the reloader actors.
//!
//! Each test attempts to falsify one claim about the supervisor, the
//! watcher or the run group. A passing test means the claim survived.
//!
//! | Category | ID Range | Description |
//! |----------|----------|-------------|
//! | A | R001-R010 | Child supervision |
//! | B | R011-R020 | Config change restarts |
//! | C | R021-R030 | Fan-out shutdown |
//! | D | R031-R035 | End-to-end |

pub mod reload;

pub use harness::TestHarness;

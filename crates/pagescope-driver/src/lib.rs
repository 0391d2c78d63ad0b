//! CDP driver for instrumenting a single page target.
//!
//! # Architecture
//!
//! - **`cdp`**: transport-agnostic [`Connection`] with command/response
//!   correlation, chunk reassembly and a per-method subscriber table.
//! - **`driver`**: [`Driver`], the page-level API used by passes and
//!   gatherers: navigation, page-script evaluation, call-site capture,
//!   network emulation and trace recording.
//! - **`probe`**: TCP readiness probe for the debugging endpoint.
//! - **`launcher`**: the [`Launcher`] seam and a local Chrome implementation.
//! - **`mock`** (feature `test-support`): an in-memory scripted target.
//!
//! # Chrome Setup
//!
//! Chrome must be running with the `--remote-debugging-port` flag, or be
//! started through [`ChromeLauncher`]:
//!
//! ```sh
//! google-chrome --remote-debugging-port=9222
//! ```

pub mod cdp;
pub mod driver;
pub mod error;
pub mod launcher;
#[cfg(feature = "test-support")]
pub mod mock;
pub mod probe;

pub use cdp::{ChunkAssembler, Connection, EventWaiter, SubscriptionId};
pub use driver::{CallSite, CallSiteCollector, Driver};
pub use error::{DriverError, EvaluationError};
pub use launcher::{ChromeLauncher, Launcher};
pub use probe::{wait_until_ready, ProbePolicy};

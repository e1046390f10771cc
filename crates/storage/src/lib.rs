//! SQLite-backed event storage for toolchain sessions.
//!
//! Every prompt, tool selection, tool call and final response of a
//! toolchain session is appended here so runs can be inspected afterwards
//! ("which tool did it call, with what arguments?").
//!
//! # Example
//!
//! ```no_run
//! use storage::{Event, EventKind, EventStore, SessionId};
//!
//! let store = EventStore::open("events.db")?;
//!
//! let session_id = SessionId::new();
//! store.append(&Event::new(
//!     session_id,
//!     EventKind::SessionStart { provider: "openai".into(), model: "gpt-4o-mini".into() },
//! ))?;
//! store.append(&Event::prompt(session_id, "What's the weather in New York City?"))?;
//!
//! for event in store.load_session(session_id, None)? {
//!     println!("{}: {:?}", event.timestamp, event.kind);
//! }
//! # Ok::<(), storage::Error>(())
//! ```

mod error;
mod event;
mod store;

pub use error::{Error, Result};
pub use event::{Event, EventKind, SessionId};
pub use store::{EventStore, SessionSummary};

//! Event log recording for toolchain runs.

use storage::{Event, EventKind, EventStore, SessionId};

/// Appends the steps of a session to an [`EventStore`].
///
/// Recording is best effort: a failed write is logged and the run goes on.
pub struct Recorder {
    store: EventStore,
    session: SessionId,
}

impl Recorder {
    /// Start a new session, writing its `SessionStart` event.
    pub fn start(
        store: EventStore,
        provider: impl Into<String>,
        model: impl Into<String>,
    ) -> storage::Result<Self> {
        let session = SessionId::new();
        store.append(&Event::new(
            session,
            EventKind::SessionStart {
                provider: provider.into(),
                model: model.into(),
            },
        ))?;
        tracing::debug!(%session, "session started");
        Ok(Self { store, session })
    }

    pub fn session_id(&self) -> SessionId {
        self.session
    }

    pub fn store(&self) -> &EventStore {
        &self.store
    }

    pub fn record(&self, kind: EventKind) {
        let name = kind.name();
        if let Err(e) = self.store.append(&Event::new(self.session, kind)) {
            tracing::warn!(session = %self.session, event = name, error = %e, "failed to record event");
        }
    }

    /// Write `SessionEnd` and hand back the store.
    pub fn end(self) -> EventStore {
        self.record(EventKind::SessionEnd);
        self.store
    }
}

use crossbeam_channel::Sender;

/// Output stop codes. Zero is a clean stop, negative values are failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum StopCode {
    /// Clean stop.
    Success = 0,
    /// Invalid destination path or URL.
    BadPath = -1,
    /// Could not connect to the server.
    ConnectFailed = -2,
    /// Server rejected the stream (bad key, bad format).
    InvalidStream = -3,
    /// Unspecified failure.
    Error = -4,
    /// Connection lost while active.
    Disconnected = -5,
    /// Encoder/service combination is not supported.
    Unsupported = -6,
    /// Out of disk space.
    NoSpace = -7,
    /// Encoder failure.
    EncodeError = -8,
}

impl StopCode {
    /// Numeric code carried by [`OutputEvent::StreamingStopped`].
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Reverse lookup of [`StopCode::code`].
    pub fn from_code(code: i32) -> Option<Self> {
        [
            Self::Success,
            Self::BadPath,
            Self::ConnectFailed,
            Self::InvalidStream,
            Self::Error,
            Self::Disconnected,
            Self::Unsupported,
            Self::NoSpace,
            Self::EncodeError,
        ]
        .into_iter()
        .find(|c| c.code() == code)
    }

    /// Short description.
    pub fn describe(self) -> &'static str {
        match self {
            Self::Success => "stream stopped",
            Self::BadPath => "invalid path or URL",
            Self::ConnectFailed => "failed to connect to server",
            Self::InvalidStream => "server rejected the stream",
            Self::Error => "output error",
            Self::Disconnected => "disconnected from server",
            Self::Unsupported => "unsupported output configuration",
            Self::NoSpace => "no space left on device",
            Self::EncodeError => "encoder error",
        }
    }
}

/// Lifecycle notifications published by an [`crate::OutputController`], in transition order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutputEvent {
    /// `setup_streaming` failed; the controller is idle again.
    SetupFailed {
        /// Why the service/encoder pairing was rejected.
        message: String,
    },
    /// The stream will start after a delay.
    DelayStarting {
        /// Delay in whole seconds (rounded up).
        seconds: u64,
    },
    /// The stream will stop after a delay.
    DelayStopping {
        /// Delay in whole seconds (rounded up).
        seconds: u64,
    },
    /// The backend reported a successful start.
    StreamingStarted,
    /// Teardown was issued to the backend.
    StreamingStopping,
    /// The session ended. `code` is 0 for a clean stop.
    StreamingStopped {
        /// Stop code (see [`StopCode`]).
        code: i32,
        /// Description of why the session ended.
        message: String,
    },
}

impl OutputEvent {
    /// Status line for display.
    pub fn status_text(&self) -> String {
        match self {
            Self::SetupFailed { message } => format!("stream setup failed: {message}"),
            Self::DelayStarting { seconds } => format!("stream start after {seconds}"),
            Self::DelayStopping { seconds } => format!("stream stop after {seconds}"),
            Self::StreamingStarted => "stream started".to_owned(),
            Self::StreamingStopping => "stream stopping".to_owned(),
            Self::StreamingStopped { code, message } => {
                format!("stream stopped: {code}, {message}")
            }
        }
    }
}

/// Sending half of the event channel, owned by the controller.
#[derive(Clone, Debug)]
pub(crate) struct EventSender {
    tx: Sender<OutputEvent>,
}

impl EventSender {
    pub(crate) fn new(tx: Sender<OutputEvent>) -> Self {
        Self { tx }
    }

    /// Emit an event. Silent when every receiver is gone.
    pub(crate) fn emit(&self, event: OutputEvent) {
        tracing::debug!(?event, "output event");
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
#[path = "../../tests/unit/output/events.rs"]
mod tests;

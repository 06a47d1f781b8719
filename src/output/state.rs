/// Lifecycle state of a streaming output.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum OutputState {
    /// No session; setup required before starting.
    #[default]
    Idle,
    /// Setup succeeded; ready to start.
    Configuring,
    /// Connect/encode-start requested, waiting for the backend.
    Starting,
    /// Waiting for the configured start delay to elapse.
    DelayedStart,
    /// Streaming.
    Active,
    /// Teardown requested, waiting for the backend.
    Stopping,
    /// Waiting for the configured stop delay to elapse.
    DelayedStop,
    /// A start failed; the handle is being torn down.
    Error,
}

impl OutputState {
    /// `true` for every state with a session in flight.
    pub fn is_streaming(self) -> bool {
        matches!(
            self,
            Self::Starting | Self::DelayedStart | Self::Active | Self::Stopping | Self::DelayedStop
        )
    }

    /// Short lowercase label used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Configuring => "configuring",
            Self::Starting => "starting",
            Self::DelayedStart => "delayed_start",
            Self::Active => "active",
            Self::Stopping => "stopping",
            Self::DelayedStop => "delayed_stop",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for OutputState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

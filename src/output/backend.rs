use crate::foundation::error::StagecastResult;
use crate::output::mode::EncoderPairing;
use crate::output::service::ServiceConfig;
use crossbeam_channel::Sender;

/// Messages consumed by a controller's dispatcher thread.
#[derive(Debug)]
pub(crate) enum ControlMsg {
    Started {
        session: u64,
    },
    StartFailed {
        session: u64,
        code: i32,
        message: String,
    },
    Stopped {
        session: u64,
        code: i32,
        message: String,
    },
    DelayElapsed {
        ticket: u64,
    },
    Shutdown,
}

/// Completion channel handed to [`OutputBackend::start`].
///
/// Every signal is tagged with the session it belongs to; signals from a session the controller
/// has already abandoned are dropped.
#[derive(Clone, Debug)]
pub struct OutputSignals {
    tx: Sender<ControlMsg>,
    session: u64,
}

impl OutputSignals {
    pub(crate) fn new(tx: Sender<ControlMsg>, session: u64) -> Self {
        Self { tx, session }
    }

    /// Session number these signals report for.
    pub fn session(&self) -> u64 {
        self.session
    }

    /// The connection is up and frames are flowing.
    pub fn started(&self) {
        let _ = self.tx.send(ControlMsg::Started {
            session: self.session,
        });
    }

    /// The connection could not be established.
    pub fn start_failed(&self, code: i32, message: impl Into<String>) {
        let _ = self.tx.send(ControlMsg::StartFailed {
            session: self.session,
            code,
            message: message.into(),
        });
    }

    /// The session ended, on request (`code == 0`) or because of a failure.
    pub fn stopped(&self, code: i32, message: impl Into<String>) {
        let _ = self.tx.send(ControlMsg::Stopped {
            session: self.session,
            code,
            message: message.into(),
        });
    }
}

/// Encode + transport collaborator driven by an [`crate::OutputController`].
///
/// Calls are serialized by the controller and must not block: `start` and `stop` only issue the
/// request and report completion through [`OutputSignals`].
pub trait OutputBackend: Send {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Bind the output to a service and encoder pairing.
    fn setup(&mut self, service: &ServiceConfig, pairing: &EncoderPairing) -> StagecastResult<()>;

    /// Issue the connect/encode-start request. An `Err` is treated as an immediate start failure.
    fn start(&mut self, signals: OutputSignals) -> StagecastResult<()>;

    /// Issue the teardown request. `force` skips any graceful flush.
    fn stop(&mut self, force: bool);

    /// Release everything bound by `setup`. Called once the session is over.
    fn teardown(&mut self);
}

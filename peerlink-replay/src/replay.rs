//! Drives one session through a script and collects everything it does, in order.

use std::cell::RefCell;
use std::io::{BufRead, Write};
use std::rc::Rc;

use anyhow::Context;
use peerlink_core::{
    Completion, ConnectionState, DeviceIdentity, Dispatch, Group, InitOutcome, IpProvisioning,
    Notification, Outcome, Peer, PromiseId, Session, SessionObserver,
};
use serde::Serialize;
use tracing::debug;

use crate::config::Config;
use crate::platform::{Issued, ScriptedPlatform};
use crate::script::{self, Step};

/// One output line.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Output {
    Issued(Issued),
    Ready(DeviceIdentity),
    Notify(Notification),
    Completed {
        tag: Option<String>,
        #[serde(flatten)]
        outcome: Outcome,
    },
    Accepted {
        line: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        promise: Option<PromiseId>,
        #[serde(skip_serializing_if = "Option::is_none")]
        queued_at: Option<usize>,
        #[serde(skip_serializing_if = "Option::is_none")]
        provisioning: Option<IpProvisioning>,
    },
    Rejected {
        line: usize,
        error: String,
    },
}

struct Recorder {
    out: Rc<RefCell<Vec<Output>>>,
}

impl Recorder {
    fn push(&self, output: Output) {
        self.out.borrow_mut().push(output);
    }
}

impl SessionObserver for Recorder {
    fn on_ready(&mut self, identity: &DeviceIdentity) {
        self.push(Output::Ready(identity.clone()));
    }

    fn on_roster_changed(&mut self, roster: &[Peer]) {
        self.push(Output::Notify(Notification::RosterChanged(roster.to_vec())));
    }

    fn on_connection_state_changed(&mut self, state: ConnectionState) {
        self.push(Output::Notify(Notification::ConnectionStateChanged(state)));
    }

    fn on_group_joined(&mut self, group: &Group) {
        self.push(Output::Notify(Notification::GroupJoined(group.clone())));
    }

    fn on_group_lost(&mut self) {
        self.push(Output::Notify(Notification::GroupLost));
    }
}

pub struct Replay {
    session: Session<ScriptedPlatform>,
    out: Rc<RefCell<Vec<Output>>>,
}

impl Replay {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let out = Rc::new(RefCell::new(Vec::new()));
        let platform = ScriptedPlatform::new(out.clone(), config.platform_ipv6_link_local);
        let session = Session::new(
            config.session.clone(),
            platform,
            Box::new(Recorder { out: out.clone() }),
        )
        .context("invalid session config")?;
        Ok(Self { session, out })
    }

    /// Run one step; returns the output it produced.
    pub fn step(&mut self, line: usize, step: Step) -> Vec<Output> {
        debug!(line, ?step, "step");
        match step {
            Step::Init => match self.session.init() {
                Ok(InitOutcome::Started) => self.accepted(line, None, None),
                Ok(InitOutcome::AlreadyInitialized) => {
                    self.rejected(line, "already initialized".to_string())
                }
                Err(e) => self.rejected(line, e.to_string()),
            },
            Step::Discover { tag } => {
                let completion = self.completion(tag);
                match self.session.discover_peers(completion) {
                    Ok(dispatch) => self.dispatched(line, dispatch, None),
                    Err(e) => self.rejected(line, e.to_string()),
                }
            }
            Step::Connect { address, tag } => {
                let completion = self.completion(tag);
                match self.session.connect_to_peer(address, completion) {
                    Ok(ticket) => {
                        self.dispatched(line, ticket.dispatch, Some(ticket.provisioning))
                    }
                    Err(e) => self.rejected(line, e.to_string()),
                }
            }
            Step::Pause => {
                let result = self.session.pause();
                self.unit(line, result)
            }
            Step::Resume => {
                let result = self.session.resume();
                self.unit(line, result)
            }
            Step::Finalize => {
                if self.session.finalize() {
                    self.accepted(line, None, None)
                } else {
                    self.rejected(line, "already finalized".to_string())
                }
            }
            Step::Resolve {
                promise,
                success,
                reason,
            } => match promise.or(self.session.platform().last_promise()) {
                Some(promise) => {
                    if !self.session.resolve_promise(promise, success, reason) {
                        self.rejected(line, format!("promise {promise} not pending"));
                    }
                }
                None => self.rejected(line, "no promise to resolve".to_string()),
            },
            Step::SetChannel { available, error } => {
                self.session
                    .platform_mut()
                    .set_channel_available(available, error);
            }
            Step::Event(event) => self.session.handle_event(event),
        }
        std::mem::take(&mut *self.out.borrow_mut())
    }

    pub fn session(&self) -> &Session<ScriptedPlatform> {
        &self.session
    }

    fn completion(&self, tag: Option<String>) -> Completion {
        let out = self.out.clone();
        Completion::from_fn(move |outcome| {
            out.borrow_mut().push(Output::Completed { tag, outcome })
        })
    }

    fn dispatched(&self, line: usize, dispatch: Dispatch, provisioning: Option<IpProvisioning>) {
        match dispatch {
            Dispatch::Issued(promise) => self.accepted(line, Some(promise), provisioning),
            Dispatch::Queued { position } => self.out.borrow_mut().push(Output::Accepted {
                line,
                promise: None,
                queued_at: Some(position),
                provisioning,
            }),
        }
    }

    fn unit(&self, line: usize, result: Result<(), peerlink_core::SessionError>) {
        match result {
            Ok(()) => self.accepted(line, None, None),
            Err(e) => self.rejected(line, e.to_string()),
        }
    }

    fn accepted(
        &self,
        line: usize,
        promise: Option<PromiseId>,
        provisioning: Option<IpProvisioning>,
    ) {
        self.out.borrow_mut().push(Output::Accepted {
            line,
            promise,
            queued_at: None,
            provisioning,
        });
    }

    fn rejected(&self, line: usize, error: String) {
        self.out.borrow_mut().push(Output::Rejected { line, error });
    }
}

/// Run a whole script, writing JSON lines to `out`. Returns the number of steps executed.
/// Session rejections are reported as output; malformed script lines abort the run.
pub fn run(config: &Config, input: impl BufRead, mut out: impl Write) -> anyhow::Result<usize> {
    let mut replay = Replay::new(config)?;
    let mut steps = 0;
    for (index, line) in input.lines().enumerate() {
        let number = index + 1;
        let line = line.with_context(|| format!("reading line {number}"))?;
        let Some(step) = script::parse_line(&line).with_context(|| format!("line {number}"))?
        else {
            continue;
        };
        for output in replay.step(number, step) {
            serde_json::to_writer(&mut out, &output)?;
            writeln!(out)?;
        }
        steps += 1;
    }
    out.flush()?;
    debug!(stats = ?replay.session().promise_stats(), "replay done");
    Ok(steps)
}

use crate::{FlowRequest, Id, NodeError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Node variants known to the flow model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeKind {
    NoopStart,
    Noop,
    Request,
    Condition,
    For,
    ForEach,
    Js,
    Delay,
}

impl NodeKind {
    pub const ALL: [NodeKind; 8] = [
        NodeKind::NoopStart,
        NodeKind::Noop,
        NodeKind::Request,
        NodeKind::Condition,
        NodeKind::For,
        NodeKind::ForEach,
        NodeKind::Js,
        NodeKind::Delay,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::NoopStart => "noop-start",
            NodeKind::Noop => "noop",
            NodeKind::Request => "request",
            NodeKind::Condition => "condition",
            NodeKind::For => "for",
            NodeKind::ForEach => "for-each",
            NodeKind::Js => "js",
            NodeKind::Delay => "delay",
        }
    }

    /// Start nodes execute but never appear on the status stream.
    pub fn is_silent(&self) -> bool {
        matches!(self, NodeKind::NoopStart)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NodeKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}

/// Capability set every executable node implements.
#[async_trait]
pub trait Node: Send + Sync {
    fn id(&self) -> Id;

    fn name(&self) -> &str;

    fn kind(&self) -> NodeKind;

    /// Execute the node and return the successors to schedule.
    ///
    /// Returns `[]` for terminal nodes, every outgoing target for
    /// unconditional nodes and the targets of the chosen handle for
    /// branching and looping nodes. Implementations must stop at
    /// suspension points once `ctx` is canceled, and take the write lock on
    /// `req.vars` for any mutation.
    async fn run(&self, ctx: &RunContext, req: &FlowRequest) -> Result<Vec<Id>, NodeError>;
}

/// Cancellation scope handed to a node invocation.
///
/// The runner derives one context per batch from the caller's context; the
/// batch deadline, when set, cancels the token once it elapses.
#[derive(Debug, Clone)]
pub struct RunContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl RunContext {
    pub fn new(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Context that is never canceled unless `cancel` is called.
    pub fn background() -> Self {
        Self::new(CancellationToken::new())
    }

    /// Child scope: canceled with the parent, cancelable on its own.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Child scope with a deadline `timeout` from now. A parent deadline
    /// that is earlier wins.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let own = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(parent) if parent < own => parent,
            _ => own,
        };
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_canceled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn deadline_passed(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Resolves once the context is canceled or its deadline elapses.
    pub async fn done(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => self.token.cancelled().await,
        }
    }

    /// `Err` if the context is already done.
    pub fn check(&self) -> Result<(), NodeError> {
        if self.deadline_passed() {
            Err(NodeError::Timeout)
        } else if self.is_canceled() {
            Err(NodeError::Canceled)
        } else {
            Ok(())
        }
    }

    /// Sleep that returns early with an error when the context ends.
    pub async fn sleep(&self, duration: Duration) -> Result<(), NodeError> {
        tokio::select! {
            _ = tokio::time::sleep(duration) => Ok(()),
            _ = self.done() => self.check().and(Err(NodeError::Canceled)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_round_trip() {
        for kind in NodeKind::ALL {
            assert_eq!(kind.as_str().parse::<NodeKind>(), Ok(kind));
        }
        assert!("http".parse::<NodeKind>().is_err());
    }

    #[tokio::test]
    async fn sleep_stops_on_cancel() {
        let ctx = RunContext::background();
        let child = ctx.child();
        ctx.cancel();
        assert_eq!(child.sleep(Duration::from_secs(5)).await, Err(NodeError::Canceled));
    }

    #[tokio::test]
    async fn sleep_reports_deadline() {
        let ctx = RunContext::background().with_timeout(Duration::from_millis(5));
        assert_eq!(ctx.sleep(Duration::from_secs(5)).await, Err(NodeError::Timeout));
    }
}

//! Trigger events that start one pipeline run.

use crate::{
    time,
    transport::{Query, Sample},
};
use std::{fmt, time::Duration};

/// One trigger event. Each activation produces exactly one output.
///
/// The ingress timestamp is captured when the activation is created and
/// stamped onto the output.
#[derive(Debug)]
pub enum Activation {
    /// An inbound query, answered in reply mode.
    Query { ingress: Duration, query: Query },
    /// A subscribed message that is itself the input record.
    Message { ingress: Duration, sample: Sample },
    /// A fixed-rate timer tick.
    Tick { ingress: Duration, seq: u64 },
}

impl Activation {
    pub fn query(query: Query) -> Self {
        Activation::Query {
            ingress: time::now(),
            query,
        }
    }

    pub fn message(sample: Sample) -> Self {
        Activation::Message {
            ingress: time::now(),
            sample,
        }
    }

    pub fn tick(seq: u64) -> Self {
        Activation::Tick {
            ingress: time::now(),
            seq,
        }
    }

    pub fn ingress(&self) -> Duration {
        match self {
            Activation::Query { ingress, .. }
            | Activation::Message { ingress, .. }
            | Activation::Tick { ingress, .. } => *ingress,
        }
    }

    pub fn origin(&self) -> Origin {
        match self {
            Activation::Query { .. } => Origin::Query,
            Activation::Message { .. } => Origin::Message,
            Activation::Tick { .. } => Origin::Tick,
        }
    }
}

/// The source of an activation, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Query,
    Message,
    Tick,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Origin::Query => "query",
            Origin::Message => "message",
            Origin::Tick => "tick",
        };
        f.write_str(name)
    }
}

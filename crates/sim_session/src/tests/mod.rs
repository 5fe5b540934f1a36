use super::*;
use sim_feed::RawEvent;

mod support;
use support::*;

mod turns_flow;

//! Scripted stimulus for exercising the engines.
//!
//! [`TwoWireController`] bit-bangs a two-wire bus the way a host controller
//! would: open-drain on both lines (release for high, pull low for low), data
//! changed only while the clock is low, data sampled a quarter period after the
//! clock rises.

use crate::kernel::{Component, DriverId, SimContext, SimDuration, Wait};
use crate::signal::Logic;
use std::any::Any;
use std::collections::VecDeque;

/// One bus-level operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusOp {
    Start,
    /// Send a byte and record whether the device acknowledged it.
    Write(u8),
    /// Clock in a byte, then acknowledge it (`ack = true`) or not.
    Read { ack: bool },
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Sda(bool),
    Scl(bool),
    SampleBit,
    SampleAck,
    EndRead,
}

#[derive(Debug)]
pub struct TwoWireController {
    sda: DriverId,
    scl: DriverId,
    quarter: SimDuration,
    steps: VecDeque<Step>,
    acks: Vec<bool>,
    reads: Vec<u8>,
    shift: u8,
    started: bool,
}

impl TwoWireController {
    /// `clock_period` is one full SCL cycle.
    pub fn new(sda: DriverId, scl: DriverId, clock_period: SimDuration) -> Self {
        Self {
            sda,
            scl,
            quarter: clock_period / 4,
            steps: VecDeque::new(),
            acks: Vec::new(),
            reads: Vec::new(),
            shift: 0,
            started: false,
        }
    }

    /// Appends operations to the script. Only takes effect if queued before the
    /// controller runs out of work.
    pub fn with_ops(mut self, ops: &[BusOp]) -> Self {
        for &op in ops {
            self.push_op(op);
        }
        self
    }

    fn push_op(&mut self, op: BusOp) {
        match op {
            BusOp::Start => {
                // Both lines high first so a repeated start is also well formed.
                self.steps.extend([Step::Sda(true), Step::Scl(true), Step::Sda(false), Step::Scl(false)]);
            }
            BusOp::Write(byte) => {
                for bit in (0..8).rev() {
                    self.steps
                        .extend([Step::Sda(byte >> bit & 1 == 1), Step::Scl(true), Step::Scl(false)]);
                }
                self.steps
                    .extend([Step::Sda(true), Step::Scl(true), Step::SampleAck, Step::Scl(false)]);
            }
            BusOp::Read { ack } => {
                self.steps.push_back(Step::Sda(true));
                for _ in 0..8 {
                    self.steps.extend([Step::Scl(true), Step::SampleBit, Step::Scl(false)]);
                }
                self.steps.extend([
                    Step::EndRead,
                    Step::Sda(!ack),
                    Step::Scl(true),
                    Step::Scl(false),
                    Step::Sda(true),
                ]);
            }
            BusOp::Stop => {
                self.steps
                    .extend([Step::Sda(false), Step::Scl(true), Step::Sda(true)]);
            }
        }
    }

    /// Acknowledge seen after each written byte, in order.
    pub fn acks(&self) -> &[bool] {
        &self.acks
    }

    /// Bytes clocked in by reads, in order.
    pub fn reads(&self) -> &[u8] {
        &self.reads
    }

    pub fn is_done(&self) -> bool {
        self.steps.is_empty()
    }

    fn set_line(ctx: &mut SimContext<'_>, line: DriverId, high: bool) {
        if high {
            ctx.release(line);
        } else {
            ctx.drive(line, Logic::Zero);
        }
    }

    fn line_high(ctx: &SimContext<'_>, line: DriverId) -> bool {
        matches!(ctx.read_logic(line.net()), Logic::One | Logic::Floating)
    }
}

impl Component for TwoWireController {
    fn kind(&self) -> &'static str {
        "two-wire-controller"
    }

    fn resume(&mut self, _process: usize, ctx: &mut SimContext<'_>) -> Wait {
        if !self.started {
            self.started = true;
            return Wait::For(self.quarter);
        }
        while let Some(step) = self.steps.pop_front() {
            match step {
                Step::Sda(high) => {
                    Self::set_line(ctx, self.sda, high);
                    return Wait::For(self.quarter);
                }
                Step::Scl(high) => {
                    Self::set_line(ctx, self.scl, high);
                    return Wait::For(self.quarter);
                }
                Step::SampleBit => {
                    self.shift = self.shift << 1 | u8::from(Self::line_high(ctx, self.sda));
                }
                Step::SampleAck => {
                    self.acks.push(!Self::line_high(ctx, self.sda));
                }
                Step::EndRead => {
                    self.reads.push(self.shift);
                    self.shift = 0;
                }
            }
        }
        Wait::Forever
    }

    fn state_label(&self) -> String {
        format!("{} steps left", self.steps.len())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

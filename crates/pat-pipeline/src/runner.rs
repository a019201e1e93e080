//! Control loop: poll the stand, debounce buttons, tick the machine.

use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use log::debug;

use crate::debounce::Debouncer;
use crate::machine::{TestStateMachine, TickInput, TickOutcome};
use crate::stand::TestStand;

/// Owns a [`TestStateMachine`] and the stand it drives.
#[derive(Debug)]
pub struct StationRunner<S: TestStand> {
    machine: TestStateMachine,
    stand: S,
    confirm: Debouncer,
    back: Debouncer,
    ticks: u64,
}

impl<S: TestStand> StationRunner<S> {
    pub fn new(machine: TestStateMachine, stand: S) -> Self {
        let debounce = machine.config().debounce_ticks;
        Self {
            machine,
            stand,
            confirm: Debouncer::new(debounce),
            back: Debouncer::new(debounce),
            ticks: 0,
        }
    }

    pub fn machine(&self) -> &TestStateMachine {
        &self.machine
    }

    pub fn stand(&self) -> &S {
        &self.stand
    }

    /// Ticks executed so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Sample every input once and run one machine tick.
    pub fn poll(&mut self) -> Result<TickOutcome> {
        let pressure = self.stand.read_pressure().context("pressure sensor")?;
        let lux = self.stand.read_lux().context("light sensor")?;
        let levels = self.stand.read_buttons().context("buttons")?;
        let input = TickInput {
            pressure,
            lux,
            confirm: self.confirm.update(levels.confirm),
            back: self.back.update(levels.back),
        };
        let outcome = self
            .machine
            .tick(&input, &mut self.stand)
            .with_context(|| format!("tick {} in {}", self.ticks, self.machine.state()))?;
        self.ticks += 1;
        Ok(outcome)
    }

    /// Run exactly `n` ticks.
    pub fn run_ticks(&mut self, n: u64) -> Result<()> {
        for _ in 0..n {
            self.poll()?;
        }
        Ok(())
    }

    /// Tick until `done` returns true after a tick, or `max_ticks` ticks have
    /// run. Returns the number of ticks executed and whether `done` fired.
    pub fn run_until<F>(&mut self, max_ticks: Option<u64>, mut done: F) -> Result<(u64, bool)>
    where
        F: FnMut(&TestStateMachine) -> bool,
    {
        self.run_paced(max_ticks, Duration::ZERO, &mut done)
    }

    /// Like [`run_until`](Self::run_until), sleeping `interval` after every
    /// tick.
    pub fn run_paced<F>(
        &mut self,
        max_ticks: Option<u64>,
        interval: Duration,
        mut done: F,
    ) -> Result<(u64, bool)>
    where
        F: FnMut(&TestStateMachine) -> bool,
    {
        let mut executed = 0;
        while max_ticks.is_none_or(|max| executed < max) {
            let outcome = self.poll()?;
            executed += 1;
            if let Some(t) = outcome.transition {
                debug!("[{}] {} -> {}", self.ticks, t.from, t.to);
            }
            if done(&self.machine) {
                return Ok((executed, true));
            }
            if !interval.is_zero() {
                thread::sleep(interval);
            }
        }
        Ok((executed, false))
    }
}

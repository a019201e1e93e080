//! Station control state machine.
//!
//! One [`TestStateMachine::tick`] call is one control-loop iteration. Each
//! tick runs, in order:
//!
//! 1. the shared pressure average update,
//! 2. the entry action of the current state, once per entry,
//! 3. the state's per-tick body,
//! 4. at most one transition (which re-arms the entry action and resets the
//!    phase tick to 0), otherwise the phase tick advances.

mod state;

pub use state::TestState;

use anyhow::{Context, Result, anyhow};
use log::{debug, error, info, warn};
use pat_core::{CalibrationController, CalibrationStatus, Phase, SampleSeries, ToleranceProfile};

use crate::config::{StartBackPolicy, StationConfig};
use crate::recorder::{ReportContext, RunRecorder, TestSummary, compose_report};
use crate::session::{TestSession, VisualResult, VisualVerdict};
use crate::stand::{Menu, TestStand};

/// Target of the start-menu `back` edge in the legacy control flow. No state
/// carries this name.
const LEGACY_START_BACK_TARGET: &str = "foo";

/// Inputs for one tick. Button flags are debounced press edges.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TickInput {
    /// Raw barometric pressure (hPa).
    pub pressure: f64,
    pub lux: Option<f64>,
    pub confirm: bool,
    pub back: bool,
}

impl TickInput {
    /// No buttons, no light sample.
    pub fn idle(pressure: f64) -> Self {
        Self {
            pressure,
            ..Self::default()
        }
    }

    pub fn confirm(pressure: f64) -> Self {
        Self {
            pressure,
            confirm: true,
            ..Self::default()
        }
    }

    pub fn back(pressure: f64) -> Self {
        Self {
            pressure,
            back: true,
            ..Self::default()
        }
    }

    pub fn with_lux(mut self, lux: f64) -> Self {
        self.lux = Some(lux);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: TestState,
    pub to: TestState,
    /// Phase tick of `from` on which the transition fired.
    pub at_tick: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickOutcome {
    /// State after the tick.
    pub state: TestState,
    pub transition: Option<Transition>,
    /// Box-filtered pressure computed this tick.
    pub average: f64,
}

#[derive(Debug, Clone)]
struct LightPhase {
    series: SampleSeries,
    peak: f64,
}

impl LightPhase {
    fn new() -> Self {
        Self {
            series: SampleSeries::new(Phase::Light),
            peak: 0.0,
        }
    }
}

#[derive(Debug, Clone)]
struct ProfileLane {
    profile: ToleranceProfile,
    series: SampleSeries,
}

#[derive(Debug, Clone)]
struct PressurePhase {
    baseline: f64,
    lanes: Vec<ProfileLane>,
    actuator_on: bool,
}

/// Drives one test stand through the unit test sequence.
#[derive(Debug)]
pub struct TestStateMachine {
    config: StationConfig,
    session: TestSession,
    recorder: RunRecorder,
    state: TestState,
    entry_pending: bool,
    phase_tick: u64,
    /// Name that resolved to [`TestState::Error`].
    undefined_target: Option<String>,
    calibration: CalibrationController,
    light: LightPhase,
    pressure: Option<PressurePhase>,
    last_report: Option<String>,
}

impl TestStateMachine {
    /// Validate the config and start at [`TestState::Start`].
    pub fn new(
        config: StationConfig,
        session: TestSession,
        recorder: RunRecorder,
    ) -> Result<Self> {
        config.validate()?;
        let calibration = CalibrationController::new(config.calibration.clone())
            .context("invalid calibration settings")?;
        Ok(Self {
            config,
            session,
            recorder,
            state: TestState::Start,
            entry_pending: true,
            phase_tick: 0,
            undefined_target: None,
            calibration,
            light: LightPhase::new(),
            pressure: None,
            last_report: None,
        })
    }

    /// Enter `state` on the next tick instead of `start`.
    pub fn starting_at(mut self, state: TestState) -> Self {
        self.enter(state);
        self
    }

    /// Enter a state by name. Unknown names land in [`TestState::Error`].
    pub fn enter_named(&mut self, name: &str) {
        let state = TestState::from_name(name);
        if state == TestState::Error && name.trim() != TestState::Error.name() {
            self.undefined_target = Some(name.to_string());
        }
        self.enter(state);
    }

    fn enter(&mut self, state: TestState) {
        self.state = state;
        self.entry_pending = true;
        self.phase_tick = 0;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn state(&self) -> TestState {
        self.state
    }

    /// Ticks since the current state was entered.
    pub fn phase_tick(&self) -> u64 {
        self.phase_tick
    }

    pub fn config(&self) -> &StationConfig {
        &self.config
    }

    pub fn session(&self) -> &TestSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut TestSession {
        &mut self.session
    }

    pub fn recorder(&self) -> &RunRecorder {
        &self.recorder
    }

    pub fn calibration(&self) -> &CalibrationController {
        &self.calibration
    }

    pub fn undefined_target(&self) -> Option<&str> {
        self.undefined_target.as_deref()
    }

    /// Samples of the current (or last) light-test attempt.
    pub fn light_series(&self) -> &SampleSeries {
        &self.light.series
    }

    /// Profiles of the current (or last) pressure phase.
    pub fn pressure_profiles(&self) -> impl Iterator<Item = &ToleranceProfile> + '_ {
        self.pressure
            .iter()
            .flat_map(|p| p.lanes.iter().map(|lane| &lane.profile))
    }

    pub fn actuator_engaged(&self) -> bool {
        self.pressure.as_ref().is_some_and(|p| p.actuator_on)
    }

    /// Text of the last composed report.
    pub fn last_report(&self) -> Option<&str> {
        self.last_report.as_deref()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Tick
    // ─────────────────────────────────────────────────────────────────────────

    /// Run one control-loop iteration.
    pub fn tick<S: TestStand + ?Sized>(
        &mut self,
        input: &TickInput,
        stand: &mut S,
    ) -> Result<TickOutcome> {
        let average = self.session.average.update(input.pressure);

        if self.entry_pending {
            self.entry_pending = false;
            self.on_enter(input, stand)
                .with_context(|| format!("entering {}", self.state))?;
        }

        let next = match self.state {
            TestState::Start => self.start_body(input),
            TestState::ChooseTranslucency => self.choose_translucency_body(input),
            TestState::PreLightTest => self.pre_light_test_body(input),
            TestState::LightTest => self.light_test_body(input, stand)?,
            TestState::CalibratePressure => self.calibrate_body(input, average, stand)?,
            TestState::PressureTest => self.pressure_body(average, stand)?,
            TestState::Report => self.report_body(input),
            TestState::Error => None,
        };

        let transition = match next {
            Some(to) => {
                let transition = Transition {
                    from: self.state,
                    to,
                    at_tick: self.phase_tick,
                };
                debug!("{} -> {} at t={}", transition.from, to, transition.at_tick);
                self.enter(to);
                Some(transition)
            }
            None => {
                self.phase_tick += 1;
                None
            }
        };

        Ok(TickOutcome {
            state: self.state,
            transition,
            average,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Entry actions
    // ─────────────────────────────────────────────────────────────────────────

    fn on_enter<S: TestStand + ?Sized>(
        &mut self,
        input: &TickInput,
        stand: &mut S,
    ) -> Result<()> {
        match self.state {
            TestState::Start => stand.show_menu(&Menu::START),
            TestState::ChooseTranslucency => {
                let run = self.session.begin_unit();
                info!("loading unit {run}");
                stand.show_menu(&Menu::CHOOSE_TRANSLUCENCY);
            }
            TestState::PreLightTest => stand.show_menu(&Menu::PRE_LIGHT_TEST),
            TestState::LightTest => {
                self.light = LightPhase::new();
                stand.show_menu(&Menu::LIGHT_TEST);
            }
            TestState::CalibratePressure => {
                self.calibration.begin();
                self.session.calibration.attempts += 1;
                info!(
                    "calibration started (attempt {})",
                    self.session.calibration.attempts
                );
                stand.show_message(
                    "Calibration Started. Do not disturb test stand.\n\
                     Pressure test will begin automatically once calibration is complete.",
                );
            }
            TestState::PressureTest => self.begin_pressure_phase(stand)?,
            TestState::Report => self.publish_report(input, stand)?,
            TestState::Error => {
                let name = self
                    .undefined_target
                    .as_deref()
                    .unwrap_or(TestState::Error.name());
                error!("invalid state: {name}");
                self.session
                    .log_failure("state_machine", format!("invalid state: {name}"));
                stand.show_message(&format!("Invalid state: {name}. Restart the test stand."));
            }
        }
        Ok(())
    }

    fn begin_pressure_phase<S: TestStand + ?Sized>(&mut self, stand: &mut S) -> Result<()> {
        let baseline = self.session.require_baseline()?;
        let lanes = self
            .config
            .pressure
            .profiles
            .iter()
            .map(|&kind| -> Result<ProfileLane> {
                Ok(ProfileLane {
                    profile: ToleranceProfile::new(kind)?,
                    series: SampleSeries::new(Phase::Pressure(kind)),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        self.pressure = Some(PressurePhase {
            baseline,
            lanes,
            actuator_on: false,
        });
        info!("pressure test started against baseline {baseline:.4} hPa");
        stand.show_message("Starting Pressure test.");
        Ok(())
    }

    fn publish_report<S: TestStand + ?Sized>(
        &mut self,
        input: &TickInput,
        stand: &mut S,
    ) -> Result<()> {
        let environment = stand.read_environment()?;
        let run = self.session.run_id();
        let ctx = ReportContext {
            run,
            tested_at: chrono::Local::now().naive_local(),
            raw_pressure: Some(input.pressure),
            baseline: self.session.baseline(),
            environment,
            visible_limit: self.config.light.visible_limit,
            unit: &self.session.unit,
        };
        let text = compose_report(&ctx);
        let summary = TestSummary::new(
            &ctx,
            &self.session.metadata,
            self.session.unit_log(),
        );

        self.recorder.persist_report(run, &text)?;
        let path = self.recorder.persist_summary(&summary)?;
        debug!("summary written to {}", path.display());

        if summary.passed {
            info!("unit {run} PASSED");
        } else {
            warn!("unit {run} FAILED");
        }
        self.session.finish_unit();
        stand.show_report(&text);
        stand.show_menu(&Menu::REPORT);
        self.last_report = Some(text);
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Per-tick bodies
    // ─────────────────────────────────────────────────────────────────────────

    fn start_body(&mut self, input: &TickInput) -> Option<TestState> {
        if input.confirm {
            return Some(TestState::ChooseTranslucency);
        }
        if !input.back {
            return None;
        }
        match self.config.start_back {
            StartBackPolicy::Ignore => {
                warn!("start menu: back has no action, ignoring");
                None
            }
            StartBackPolicy::Calibrate => Some(TestState::CalibratePressure),
            StartBackPolicy::Legacy => {
                self.undefined_target = Some(LEGACY_START_BACK_TARGET.to_string());
                Some(TestState::Error)
            }
        }
    }

    fn choose_translucency_body(&mut self, input: &TickInput) -> Option<TestState> {
        if input.confirm {
            return Some(TestState::PreLightTest);
        }
        if input.back {
            self.session.unit.visual = VisualResult {
                verdict: VisualVerdict::Skipped,
                peak_lux: None,
            };
            self.session
                .log_success_with_notes("light_test", "skipped: translucent mask");
            return Some(TestState::CalibratePressure);
        }
        None
    }

    fn pre_light_test_body(&mut self, input: &TickInput) -> Option<TestState> {
        if input.confirm {
            Some(TestState::LightTest)
        } else if input.back {
            Some(TestState::ChooseTranslucency)
        } else {
            None
        }
    }

    fn light_test_body<S: TestStand + ?Sized>(
        &mut self,
        input: &TickInput,
        stand: &mut S,
    ) -> Result<Option<TestState>> {
        let t = self.phase_tick;
        let limit = self.config.light.visible_limit;
        let lux = input.lux.unwrap_or_else(|| {
            debug!("no light sample at t={t}");
            0.0
        });
        self.light.peak = self.light.peak.max(lux);
        let peak = self.light.peak;

        if lux > limit {
            self.light.series.push(t, &[limit, lux, peak])?;
            self.session.unit.visual = VisualResult {
                verdict: VisualVerdict::Failed,
                peak_lux: Some(peak),
            };
            self.recorder
                .persist_series(self.session.run_id(), &self.light.series)?;
            warn!("light test failed at t={t}: {lux:.2} lux > {limit:.2}");
            self.session
                .log_failure("light_test", format!("{lux:.2} lux exceeds limit {limit:.2}"));
            stand.show_message(
                "Light Test complete: FAILED\n\nPress Button to restart visual test.",
            );
            return Ok(Some(TestState::PreLightTest));
        }

        let recorded = self.config.light.recorded_limit.value(limit);
        self.light.series.push(t, &[recorded, lux, peak])?;

        if input.confirm {
            self.session.unit.visual = VisualResult {
                verdict: VisualVerdict::Passed,
                peak_lux: Some(peak),
            };
            self.recorder
                .persist_series(self.session.run_id(), &self.light.series)?;
            info!("light test passed (peak {peak:.2} lux)");
            self.session
                .log_success_with_notes("light_test", format!("peak {peak:.2} lux"));
            stand.show_message("Light Test complete: PASSED");
            return Ok(Some(TestState::CalibratePressure));
        }
        Ok(None)
    }

    fn calibrate_body<S: TestStand + ?Sized>(
        &mut self,
        input: &TickInput,
        average: f64,
        stand: &mut S,
    ) -> Result<Option<TestState>> {
        if input.back {
            self.calibration.cancel_token().cancel();
        }
        let t = self.phase_tick;
        let status = self.calibration.step(t, average)?;

        let next = match status {
            CalibrationStatus::WarmingUp => None,
            CalibrationStatus::Settling { consecutive } => {
                let total = self.config.calibration.required_in_range.saturating_add(1);
                stand.show_progress(consecutive, total);
                None
            }
            CalibrationStatus::Complete { baseline } => {
                self.session.set_baseline(baseline);
                self.recorder
                    .persist_series(self.session.run_id(), self.calibration.series())?;
                info!("calibration complete at t={t}: baseline {baseline:.4} hPa");
                self.session
                    .log_success_with_notes("calibration", format!("baseline {baseline:.4} hPa"));
                stand.show_message("Calibration Complete");
                Some(TestState::PressureTest)
            }
            CalibrationStatus::TimedOut => {
                warn!("calibration timed out after {t} ticks without a stable baseline");
                self.session.log_failure(
                    "calibration",
                    format!("no stable baseline after {t} ticks"),
                );
                stand.show_message("Calibration timed out. Check the test stand and retry.");
                Some(TestState::ChooseTranslucency)
            }
            CalibrationStatus::Cancelled => {
                info!("calibration cancelled by operator at t={t}");
                self.session
                    .log_failure("calibration", "cancelled by operator");
                stand.show_message("Calibration cancelled.");
                Some(TestState::ChooseTranslucency)
            }
        };
        Ok(next)
    }

    fn pressure_body<S: TestStand + ?Sized>(
        &mut self,
        average: f64,
        stand: &mut S,
    ) -> Result<Option<TestState>> {
        let t = self.phase_tick;
        let timing = &self.config.pressure;
        let phase = self
            .pressure
            .as_mut()
            .ok_or_else(|| anyhow!("pressure test ticked before its entry action"))?;

        let value = average - phase.baseline;
        for lane in &mut phase.lanes {
            let bounds = lane.profile.step_plot(t, value);
            lane.series.push(t, &[bounds.min, value, bounds.max])?;
        }

        if t == timing.actuator_on_tick {
            stand.set_actuator(true)?;
            phase.actuator_on = true;
            debug!("actuator on at t={t}");
        } else if t == timing.actuator_off_tick {
            stand.set_actuator(false)?;
            phase.actuator_on = false;
            debug!("actuator off at t={t}");
        }

        if t + 1 < timing.duration_ticks {
            return Ok(None);
        }

        if phase.actuator_on {
            stand.set_actuator(false)?;
            phase.actuator_on = false;
            warn!("actuator still engaged at end of waveform, forced off");
        }
        let run = self.session.run_id();
        let mut reports = Vec::with_capacity(phase.lanes.len());
        for lane in &phase.lanes {
            self.recorder.persist_series(run, &lane.series)?;
            let report = lane.profile.report();
            if report.passed {
                info!("profile {}: PASSED", report.name);
            } else {
                info!(
                    "profile {}: FAILED ({} of {} points)",
                    report.name, report.failed_points, report.points_evaluated
                );
            }
            reports.push(report);
        }
        let failed: Vec<_> = reports
            .iter()
            .filter(|r| !r.passed)
            .map(|r| r.name.as_str())
            .collect();
        if failed.is_empty() {
            self.session.log_success("pressure_test");
        } else {
            let notes = format!("failed profiles: {}", failed.join(", "));
            self.session.log_failure("pressure_test", notes);
        }
        self.session.unit.pressure = reports;
        Ok(Some(TestState::Report))
    }

    fn report_body(&mut self, input: &TickInput) -> Option<TestState> {
        if input.confirm {
            info!("load next mask");
            return Some(TestState::ChooseTranslucency);
        }
        None
    }
}

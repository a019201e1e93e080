//! Simulated test stand: sensor noise, a breathing valve and a patient
//! operator who answers every menu with the confirm button.

use anyhow::Result;
use log::{debug, info};
use pat_pipeline::{ButtonLevels, EnvironmentReading, Menu, TestStand};
use rand::{Rng, SeedableRng, rngs::StdRng};

const AMBIENT_HPA: f64 = 1013.25;
const PRESSURE_NOISE_HPA: f64 = 0.005;
/// Overpressure the valve settles to while open.
const BREATH_HPA: f64 = 2.5;
/// Fraction of the remaining gap closed per tick.
const BREATH_RESPONSE: f64 = 0.35;
const AMBIENT_LUX_MAX: f64 = 20.0;
/// Ticks the operator holds a button down.
const PRESS_TICKS: u32 = 3;

#[derive(Debug)]
pub struct SimulatedStand {
    rng: StdRng,
    valve_open: bool,
    overpressure: f64,
    operator_delay: Option<u32>,
    holding: u32,
}

impl SimulatedStand {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            valve_open: false,
            overpressure: 0.0,
            operator_delay: None,
            holding: 0,
        }
    }
}

impl TestStand for SimulatedStand {
    fn read_pressure(&mut self) -> Result<f64> {
        let target = if self.valve_open { BREATH_HPA } else { 0.0 };
        self.overpressure += (target - self.overpressure) * BREATH_RESPONSE;
        let noise = self.rng.random_range(-PRESSURE_NOISE_HPA..PRESSURE_NOISE_HPA);
        Ok(AMBIENT_HPA + self.overpressure + noise)
    }

    fn read_lux(&mut self) -> Result<Option<f64>> {
        Ok(Some(self.rng.random_range(0.0..AMBIENT_LUX_MAX)))
    }

    fn read_buttons(&mut self) -> Result<ButtonLevels> {
        if self.holding > 0 {
            self.holding -= 1;
            return Ok(ButtonLevels {
                confirm: true,
                back: false,
            });
        }
        match self.operator_delay {
            Some(0) => {
                self.operator_delay = None;
                self.holding = PRESS_TICKS;
            }
            Some(n) => self.operator_delay = Some(n - 1),
            None => {}
        }
        Ok(ButtonLevels::default())
    }

    fn read_environment(&mut self) -> Result<Option<EnvironmentReading>> {
        Ok(Some(EnvironmentReading {
            temperature_c: 21.0 + self.rng.random_range(-0.5..0.5),
            humidity_pct: 40.0 + self.rng.random_range(-2.0..2.0),
        }))
    }

    fn set_actuator(&mut self, engaged: bool) -> Result<()> {
        debug!("valve {}", if engaged { "open" } else { "closed" });
        self.valve_open = engaged;
        Ok(())
    }

    fn show_menu(&mut self, menu: &Menu) {
        info!(
            "[{}] {} | confirm: {} | back: {}",
            menu.title, menu.body, menu.confirm, menu.back
        );
        if !menu.confirm.is_empty() {
            self.operator_delay = Some(self.rng.random_range(20..60));
        }
    }

    fn show_message(&mut self, message: &str) {
        info!("{message}");
    }

    fn show_progress(&mut self, done: u32, total: u32) {
        if done > 0 && done % 25 == 0 {
            debug!("calibration {done}/{total}");
        }
    }

    fn show_report(&mut self, report: &str) {
        println!("{report}");
    }
}

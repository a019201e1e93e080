//! Hardware seam between the state machine and the physical test stand.

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Raw (not debounced) button levels sampled on one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ButtonLevels {
    pub confirm: bool,
    pub back: bool,
}

/// Ambient conditions printed on the report.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentReading {
    /// Degrees Celsius.
    pub temperature_c: f64,
    /// Percent relative humidity.
    pub humidity_pct: f64,
}

/// Operator menu: a title, a body and the labels of the two buttons.
///
/// An empty label means the button does nothing in that menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Menu {
    pub title: &'static str,
    pub body: &'static str,
    pub confirm: &'static str,
    pub back: &'static str,
}

impl Menu {
    pub const START: Menu = Menu {
        title: "Starting P.A.T.",
        body: "Do you want to test or calibrate?",
        confirm: "Test",
        back: "Calibrate",
    };
    pub const CHOOSE_TRANSLUCENCY: Menu = Menu {
        title: "Is this mask translucent?",
        body: "We'll skip the light-test process if the\nmask is translucent or transparent.",
        confirm: "Opaque",
        back: "Translucent",
    };
    pub const PRE_LIGHT_TEST: Menu = Menu {
        title: "Prepare for Light Test",
        body: "Install the mask and check the seal\nhave a flashlight ready to scan the seal",
        confirm: "Begin",
        back: "Go Back",
    };
    pub const LIGHT_TEST: Menu = Menu {
        title: "Light Test in process",
        body: "sweep flashlight around the edge of the mask.",
        confirm: "Done",
        back: "",
    };
    pub const REPORT: Menu = Menu {
        title: "Test complete",
        body: "",
        confirm: "Next Test",
        back: "",
    };
}

/// Sensors, actuator and operator display of one test stand.
///
/// The state machine calls these synchronously from the control loop.
/// Sensor and actuator failures are returned as errors and stop the run;
/// display calls cannot fail.
pub trait TestStand {
    /// Barometric pressure in hPa.
    fn read_pressure(&mut self) -> Result<f64>;

    /// Light level in lux, `None` when the sensor has no fresh sample.
    fn read_lux(&mut self) -> Result<Option<f64>>;

    fn read_buttons(&mut self) -> Result<ButtonLevels>;

    /// Temperature and humidity, `None` when unavailable.
    fn read_environment(&mut self) -> Result<Option<EnvironmentReading>>;

    /// Open (`true`) or close the breathing valve.
    fn set_actuator(&mut self, engaged: bool) -> Result<()>;

    fn show_menu(&mut self, menu: &Menu);

    fn show_message(&mut self, message: &str);

    /// Calibration progress; the default ignores it.
    fn show_progress(&mut self, _done: u32, _total: u32) {}

    fn show_report(&mut self, report: &str);
}

impl<T: TestStand + ?Sized> TestStand for &mut T {
    fn read_pressure(&mut self) -> Result<f64> {
        (**self).read_pressure()
    }

    fn read_lux(&mut self) -> Result<Option<f64>> {
        (**self).read_lux()
    }

    fn read_buttons(&mut self) -> Result<ButtonLevels> {
        (**self).read_buttons()
    }

    fn read_environment(&mut self) -> Result<Option<EnvironmentReading>> {
        (**self).read_environment()
    }

    fn set_actuator(&mut self, engaged: bool) -> Result<()> {
        (**self).set_actuator(engaged)
    }

    fn show_menu(&mut self, menu: &Menu) {
        (**self).show_menu(menu)
    }

    fn show_message(&mut self, message: &str) {
        (**self).show_message(message)
    }

    fn show_progress(&mut self, done: u32, total: u32) {
        (**self).show_progress(done, total)
    }

    fn show_report(&mut self, report: &str) {
        (**self).show_report(report)
    }
}

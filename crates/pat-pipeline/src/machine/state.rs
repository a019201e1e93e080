use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Station states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestState {
    Start,
    ChooseTranslucency,
    PreLightTest,
    LightTest,
    CalibratePressure,
    PressureTest,
    Report,
    /// Terminal catch-all for undefined targets.
    Error,
}

impl TestState {
    pub const ALL: [TestState; 8] = [
        TestState::Start,
        TestState::ChooseTranslucency,
        TestState::PreLightTest,
        TestState::LightTest,
        TestState::CalibratePressure,
        TestState::PressureTest,
        TestState::Report,
        TestState::Error,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TestState::Start => "start",
            TestState::ChooseTranslucency => "choose_translucency",
            TestState::PreLightTest => "pre_light_test",
            TestState::LightTest => "light_test",
            TestState::CalibratePressure => "calibrate_pressure",
            TestState::PressureTest => "pressure_test",
            TestState::Report => "report",
            TestState::Error => "error",
        }
    }

    /// Resolve a state name; anything unknown maps to [`TestState::Error`].
    pub fn from_name(name: &str) -> TestState {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|s| s.name() == name)
            .unwrap_or(TestState::Error)
    }
}

impl fmt::Display for TestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TestState {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_name(s))
    }
}

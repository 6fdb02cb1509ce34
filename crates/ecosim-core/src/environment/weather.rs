//! Weather and Climate
//!
//! Seasonal weather state machine, climate emergencies, and the stress vector
//! that every environmental multiplier is derived from.

use ecosim_events::{EmergencyKind, Season};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::rng::RandomExt;

pub mod climate_constants {
    /// Amplitude of the daily temperature swing
    pub const DAILY_SWING: f32 = 3.0;
    /// Ticks per simulated day
    pub const DAY_LENGTH: f32 = 100.0;
    pub const WEATHER_MIN_DURATION: u32 = 40;
    pub const WEATHER_MAX_DURATION: u32 = 160;
    pub const WEATHER_MIN_INTENSITY: f32 = 0.2;
    pub const EMERGENCY_MIN_DURATION: u32 = 80;
    pub const EMERGENCY_MAX_DURATION: u32 = 240;
    pub const EMERGENCY_MIN_SEVERITY: f32 = 0.5;
    /// Stress amplification while an emergency is active
    pub const EMERGENCY_AMPLIFIER: f32 = 1.5;
}

use climate_constants::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeatherCategory {
    Clear,
    Cloudy,
    Rain,
    Storm,
    Snow,
    Fog,
}

impl WeatherCategory {
    pub const ALL: [WeatherCategory; 6] = [
        WeatherCategory::Clear,
        WeatherCategory::Cloudy,
        WeatherCategory::Rain,
        WeatherCategory::Storm,
        WeatherCategory::Snow,
        WeatherCategory::Fog,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WeatherCategory::Clear => "clear",
            WeatherCategory::Cloudy => "cloudy",
            WeatherCategory::Rain => "rain",
            WeatherCategory::Storm => "storm",
            WeatherCategory::Snow => "snow",
            WeatherCategory::Fog => "fog",
        }
    }

    /// Temperature offset applied on top of the seasonal base
    pub fn temperature_offset(&self, intensity: f32) -> f32 {
        match self {
            WeatherCategory::Clear => 1.0 * intensity,
            WeatherCategory::Cloudy => -1.0 * intensity,
            WeatherCategory::Rain => -2.0 * intensity,
            WeatherCategory::Storm => -3.0 * intensity,
            WeatherCategory::Snow => -4.0 * intensity,
            WeatherCategory::Fog => -0.5 * intensity,
        }
    }
}

/// Selection weights per season, in `WeatherCategory::ALL` order
pub fn season_weights(season: Season) -> [f32; 6] {
    match season {
        Season::Spring => [0.35, 0.25, 0.25, 0.05, 0.0, 0.10],
        Season::Summer => [0.50, 0.20, 0.10, 0.15, 0.0, 0.05],
        Season::Autumn => [0.25, 0.25, 0.25, 0.10, 0.0, 0.15],
        Season::Winter => [0.20, 0.25, 0.05, 0.10, 0.30, 0.10],
    }
}

/// Seasonal base temperature
pub fn base_temperature(season: Season) -> f32 {
    match season {
        Season::Spring => 15.0,
        Season::Summer => 28.0,
        Season::Autumn => 12.0,
        Season::Winter => -2.0,
    }
}

/// Temperature at `tick` before weather offsets
pub fn seasonal_temperature(season: Season, tick: u64) -> f32 {
    let phase = (tick as f32 % DAY_LENGTH) / DAY_LENGTH * std::f32::consts::TAU;
    base_temperature(season) + DAILY_SWING * phase.sin()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeatherState {
    pub category: WeatherCategory,
    pub intensity: f32,
    pub remaining: u32,
}

impl WeatherState {
    pub fn calm() -> Self {
        Self {
            category: WeatherCategory::Clear,
            intensity: 0.0,
            remaining: 0,
        }
    }

    /// Draw fresh weather for `season`
    pub fn roll<R: Rng + ?Sized>(season: Season, rng: &mut R) -> Self {
        let index = rng.pick_weighted(&season_weights(season)).unwrap_or(0);
        Self {
            category: WeatherCategory::ALL[index],
            intensity: rng.between(WEATHER_MIN_INTENSITY, 1.0),
            remaining: rng.gen_range(WEATHER_MIN_DURATION..=WEATHER_MAX_DURATION),
        }
    }

    /// Intensity if the current category is `category`, else 0
    pub fn intensity_of(&self, category: WeatherCategory) -> f32 {
        if self.category == category {
            self.intensity
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClimateEmergency {
    pub kind: EmergencyKind,
    pub severity: f32,
    pub duration: u32,
    pub remaining: u32,
}

impl ClimateEmergency {
    pub fn roll<R: Rng + ?Sized>(season: Season, rng: &mut R) -> Self {
        use EmergencyKind::*;
        let options: [(EmergencyKind, f32); 3] = match season {
            Season::Spring => [(Flood, 0.5), (Hurricane, 0.3), (Heatwave, 0.2)],
            Season::Summer => [(Heatwave, 0.45), (Drought, 0.35), (Hurricane, 0.2)],
            Season::Autumn => [(Hurricane, 0.4), (Flood, 0.4), (Drought, 0.2)],
            Season::Winter => [(Coldsnap, 0.7), (Hurricane, 0.2), (Flood, 0.1)],
        };
        let weights = options.map(|(_, w)| w);
        let kind = rng
            .pick_weighted(&weights)
            .map_or(options[0].0, |i| options[i].0);
        let duration = rng.gen_range(EMERGENCY_MIN_DURATION..=EMERGENCY_MAX_DURATION);
        Self {
            kind,
            severity: rng.between(EMERGENCY_MIN_SEVERITY, 1.0),
            duration,
            remaining: duration,
        }
    }
}

/// Environmental stress components, each in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StressVector {
    pub heat: f32,
    pub cold: f32,
    pub storm: f32,
    pub drought: f32,
    pub flood: f32,
}

impl StressVector {
    pub fn compute(
        temperature: f32,
        season: Season,
        weather: &WeatherState,
        emergency: Option<&ClimateEmergency>,
    ) -> Self {
        let mut s = Self {
            heat: (temperature - 25.0) / 15.0,
            cold: (5.0 - temperature) / 20.0 + 0.3 * weather.intensity_of(WeatherCategory::Snow),
            storm: weather.intensity_of(WeatherCategory::Storm),
            drought: if season == Season::Summer {
                0.3 * weather.intensity_of(WeatherCategory::Clear)
            } else {
                0.0
            },
            flood: 0.4 * weather.intensity_of(WeatherCategory::Rain),
        };
        s = s.clamped();

        if let Some(e) = emergency {
            let amplify = |v: f32| ((v + e.severity) * EMERGENCY_AMPLIFIER).clamp(0.0, 1.0);
            match e.kind {
                EmergencyKind::Heatwave => s.heat = amplify(s.heat),
                EmergencyKind::Coldsnap => s.cold = amplify(s.cold),
                EmergencyKind::Hurricane => {
                    s.storm = amplify(s.storm);
                    s.flood = amplify(s.flood);
                }
                EmergencyKind::Drought => s.drought = amplify(s.drought),
                EmergencyKind::Flood => s.flood = amplify(s.flood),
            }
        }
        s
    }

    fn clamped(self) -> Self {
        let c = |v: f32| if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 };
        Self {
            heat: c(self.heat),
            cold: c(self.cold),
            storm: c(self.storm),
            drought: c(self.drought),
            flood: c(self.flood),
        }
    }

    /// Copy with flood stress removed, for agents standing on high ground
    pub fn without_flood(&self) -> Self {
        Self { flood: 0.0, ..*self }
    }

    pub fn max(&self) -> f32 {
        self.heat
            .max(self.cold)
            .max(self.storm)
            .max(self.drought)
            .max(self.flood)
    }

    pub fn energy_multiplier(&self) -> f32 {
        (1.0 + 0.8 * self.heat + 1.2 * self.cold + 0.5 * self.storm + 0.3 * self.drought)
            .clamp(0.5, 3.0)
    }

    pub fn movement_multiplier(&self) -> f32 {
        (1.0 - 0.3 * self.storm - 0.2 * self.flood - 0.15 * self.cold).clamp(0.3, 1.0)
    }

    pub fn infection_multiplier(&self) -> f32 {
        (1.0 + 0.5 * self.cold + 0.3 * self.flood + 0.2 * self.storm).clamp(0.5, 2.5)
    }

    pub fn resource_multiplier(&self) -> f32 {
        (1.0 - 0.6 * self.drought - 0.3 * self.flood - 0.3 * self.cold - 0.2 * self.storm)
            .clamp(0.1, 1.5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    #[test]
    fn test_mild_spring_has_no_stress() {
        let s = StressVector::compute(15.0, Season::Spring, &WeatherState::calm(), None);
        assert_eq!(s, StressVector::default());
        assert_eq!(s.energy_multiplier(), 1.0);
        assert_eq!(s.movement_multiplier(), 1.0);
    }

    #[test]
    fn test_energy_multiplier_formula() {
        let s = StressVector {
            heat: 0.5,
            cold: 0.0,
            storm: 0.4,
            drought: 1.0,
            flood: 0.0,
        };
        assert!((s.energy_multiplier() - (1.0 + 0.4 + 0.2 + 0.3)).abs() < 1e-6);
        let extreme = StressVector {
            heat: 1.0,
            cold: 1.0,
            storm: 1.0,
            drought: 1.0,
            flood: 1.0,
        };
        assert_eq!(extreme.energy_multiplier(), 3.0);
        assert!((extreme.movement_multiplier() - 0.35).abs() < 1e-6);
        assert_eq!(extreme.resource_multiplier(), 0.1);
    }

    #[test]
    fn test_cold_winter_snow() {
        let weather = WeatherState {
            category: WeatherCategory::Snow,
            intensity: 1.0,
            remaining: 10,
        };
        let s = StressVector::compute(-5.0, Season::Winter, &weather, None);
        assert!((s.cold - 0.8).abs() < 1e-6);
        assert_eq!(s.heat, 0.0);
    }

    #[test]
    fn test_emergency_amplifies_its_component() {
        let weather = WeatherState::calm();
        let heatwave = ClimateEmergency {
            kind: EmergencyKind::Heatwave,
            severity: 0.5,
            duration: 100,
            remaining: 100,
        };
        let s = StressVector::compute(28.0, Season::Summer, &weather, Some(&heatwave));
        // (0.2 + 0.5) * 1.5 clamped to 1
        assert_eq!(s.heat, 1.0);
        assert_eq!(s.cold, 0.0);
    }

    #[test]
    fn test_rolled_weather_in_bounds() {
        let mut rng = SmallRng::seed_from_u64(8);
        for season in [Season::Spring, Season::Summer, Season::Autumn, Season::Winter] {
            for _ in 0..50 {
                let w = WeatherState::roll(season, &mut rng);
                assert!((WEATHER_MIN_INTENSITY..=1.0).contains(&w.intensity));
                assert!((WEATHER_MIN_DURATION..=WEATHER_MAX_DURATION).contains(&w.remaining));
                if season != Season::Winter {
                    assert_ne!(w.category, WeatherCategory::Snow);
                }
                let e = ClimateEmergency::roll(season, &mut rng);
                assert!((EMERGENCY_MIN_SEVERITY..=1.0).contains(&e.severity));
            }
        }
    }

    #[test]
    fn test_temperature_daily_swing() {
        let t0 = seasonal_temperature(Season::Summer, 0);
        let t25 = seasonal_temperature(Season::Summer, 25);
        assert!((t0 - 28.0).abs() < 1e-4);
        assert!((t25 - 31.0).abs() < 1e-3);
    }
}

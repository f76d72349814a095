//! Sampling parameters for a single generation.

use crate::{
    error::{Error, Result},
    timing::GenerationWindow,
};
use serde::Deserialize;

/// How a generator should sample, and which section it should fill.
///
/// All the count parameters default to 1, which turns beam search into plain
/// step-by-step sampling.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct GeneratorOptions {
    /// Above 1 the output gets more random and strays further from the primer, below
    /// 1 it gets more predictable
    pub temperature: f64,
    /// How many candidate sequences are kept between iterations
    pub beam_size: usize,
    /// How many continuations are tried for each candidate on each iteration
    pub branch_factor: usize,
    /// How many steps each continuation adds
    pub steps_per_iteration: usize,
    /// Seed for the random number generator, for reproducible output
    pub seed: Option<u64>,
    /// The sections to fill. Generators accept exactly one.
    pub generate_sections: Vec<GenerationWindow>,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        GeneratorOptions {
            temperature: 1.0,
            beam_size: 1,
            branch_factor: 1,
            steps_per_iteration: 1,
            seed: None,
            generate_sections: Vec::new(),
        }
    }
}

impl GeneratorOptions {
    /// Default sampling over a single section.
    pub fn for_window(window: GenerationWindow) -> Self {
        GeneratorOptions {
            generate_sections: vec![window],
            ..Self::default()
        }
    }

    /// Set the temperature.
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the beam search parameters.
    pub fn with_beam(
        mut self,
        beam_size: usize,
        branch_factor: usize,
        steps_per_iteration: usize,
    ) -> Self {
        self.beam_size = beam_size;
        self.branch_factor = branch_factor;
        self.steps_per_iteration = steps_per_iteration;
        self
    }

    /// Set the random seed.
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    /// Check the parameters and return the one section to generate.
    pub fn validate(&self) -> Result<GenerationWindow> {
        if !(self.temperature.is_finite() && self.temperature > 0.) {
            return Err(Error::invalid(format!(
                "temperature must be positive, got {}",
                self.temperature
            )));
        }

        for &(name, value) in &[
            ("beam size", self.beam_size),
            ("branch factor", self.branch_factor),
            ("steps per iteration", self.steps_per_iteration),
        ] {
            if value == 0 {
                return Err(Error::invalid(format!("{} must be at least 1", name)));
            }
        }

        let window = match *self.generate_sections.as_slice() {
            [window] => window,
            ref sections => {
                return Err(Error::invalid(format!(
                    "expected exactly one generate section, got {}",
                    sections.len()
                )))
            }
        };

        if !(window.start_time >= 0. && window.end_time > window.start_time) {
            return Err(Error::invalid(format!(
                "generate section must end after it starts, got {:?}",
                window
            )));
        }

        Ok(window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window() -> GenerationWindow {
        GenerationWindow {
            start_time: 2.,
            end_time: 6.,
        }
    }

    #[test]
    fn defaults_are_valid() {
        let options = GeneratorOptions::for_window(window());
        assert_eq!(options.validate().unwrap(), window());
    }

    #[test]
    fn rejects_bad_parameters() {
        let base = GeneratorOptions::for_window(window());

        assert!(base.clone().with_temperature(0.).validate().is_err());
        assert!(base.clone().with_temperature(f64::NAN).validate().is_err());
        assert!(base.clone().with_beam(0, 1, 1).validate().is_err());
        assert!(base.clone().with_beam(1, 0, 1).validate().is_err());
        assert!(base.clone().with_beam(1, 1, 0).validate().is_err());
        assert!(base.with_beam(4, 2, 8).validate().is_ok());
    }

    #[test]
    fn needs_exactly_one_non_empty_section() {
        assert!(GeneratorOptions::default().validate().is_err());

        let mut two = GeneratorOptions::for_window(window());
        two.generate_sections.push(window());
        assert!(two.validate().is_err());

        let empty = GeneratorOptions::for_window(GenerationWindow {
            start_time: 2.,
            end_time: 2.,
        });
        assert!(empty.validate().is_err());
    }

    #[test]
    fn parses_from_ron() {
        let options: GeneratorOptions = ron::from_str(
            "(temperature: 1.2, beam_size: 2, \
             generate_sections: [(start_time: 0.0, end_time: 4.0)])",
        )
        .unwrap();

        assert_eq!(options.temperature, 1.2);
        assert_eq!(options.beam_size, 2);
        assert_eq!(options.branch_factor, 1);
        assert_eq!(options.validate().unwrap().end_time, 4.);
    }
}

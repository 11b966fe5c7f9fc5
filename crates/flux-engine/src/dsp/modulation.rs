//! Amplitude modulation by a repeating carrier table.

use std::f64::consts::PI;
use std::sync::Arc;

use super::effect::{Effect, Sample};
use super::param::{ParamWatch, Parameter, Parameters};
use super::registry::{EffectContext, EffectType};
use crate::SAMPLE_RATE;

const MAX_CARRIER: usize = SAMPLE_RATE as usize;

/// Normalises `s * (1 - s^20)` to a peak of 1.
const SAW_NORMALISATION: f64 = 1.2226448438558761;

fn linspace(start: f64, end: f64, n: usize) -> impl Iterator<Item = f64> {
    let step = if n > 1 {
        (end - start) / (n - 1) as f64
    } else {
        0.0
    };
    (0..n).map(move |i| start + step * i as f64)
}

/// Symmetric Hamming window of `n` points.
pub fn hamming(n: usize) -> impl Iterator<Item = f64> {
    (0..n).map(move |k| {
        if n == 1 {
            1.0
        } else {
            0.54 - 0.46 * (2.0 * PI * k as f64 / (n - 1) as f64).cos()
        }
    })
}

/// A carrier table with a read position that survives across blocks.
#[derive(Debug)]
pub struct Carrier {
    table: Vec<f64>,
    phase: usize,
}

impl Carrier {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            table: Vec::with_capacity(capacity),
            phase: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn table(&self) -> &[f64] {
        &self.table
    }

    /// Replace the table, moving the phase to the same fraction of the new
    /// period.
    pub fn rebuild(&mut self, fill: impl FnOnce(&mut Vec<f64>)) {
        let old_len = self.table.len();
        self.table.clear();
        fill(&mut self.table);
        let new_len = self.table.len();
        self.phase = if old_len == 0 || new_len == 0 {
            0
        } else {
            (self.phase * new_len / old_len).min(new_len - 1)
        };
    }

    #[inline]
    fn next(&mut self) -> f64 {
        let c = self.table[self.phase];
        self.phase += 1;
        if self.phase == self.table.len() {
            self.phase = 0;
        }
        c
    }

    fn rewind(&mut self) {
        self.phase = 0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Sin,
    Sawtooth,
    Square,
}

impl Shape {
    pub const CHOICES: [(&'static str, Option<&'static str>); 3] = [
        ("Sin", Some("res/icons/wave_sine.png")),
        ("Sawtooth", Some("res/icons/wave_saw.png")),
        ("Square", Some("res/icons/wave_square.png")),
    ];

    fn from_index(index: usize) -> Self {
        match index {
            1 => Self::Sawtooth,
            2 => Self::Square,
            _ => Self::Sin,
        }
    }
}

/// Append the carrier for a tremolo of `period` samples to `out`. Sin and
/// Sawtooth repeat every half period; Square spans the whole period.
pub fn tremolo_table(shape: Shape, period: usize, out: &mut Vec<f64>) {
    let half = period / 2;
    match shape {
        Shape::Sin => out.extend(linspace(0.0, PI, half).map(f64::sin)),
        Shape::Sawtooth => out.extend(
            linspace(0.0, 1.0, half).map(|s| s * (1.0 - s.powi(20)) * SAW_NORMALISATION),
        ),
        Shape::Square => {
            out.extend(
                linspace(0.0, 1.0, half)
                    .zip(linspace(1.0, 0.0, half))
                    .map(|(rise, fall)| (1.0 - rise.powi(20)) * (1.0 - fall.powi(20))),
            );
            out.resize(out.len() + half, 0.0);
        }
    }
}

pub struct Tremolo {
    params: Parameters,
    speed: Arc<Parameter>,
    mix: Arc<Parameter>,
    shape: Arc<Parameter>,
    watch: ParamWatch,
    carrier: Carrier,
}

impl Tremolo {
    /// Carrier period in samples for the current speed.
    pub fn period(&self) -> usize {
        let bpm = self.speed.value().max(1.0);
        (f64::from(SAMPLE_RATE) * 60.0 / bpm).round() as usize
    }

    fn rebuild(&mut self) {
        let shape = Shape::from_index(self.shape.choice_index());
        let period = self.period();
        self.carrier.rebuild(|t| tremolo_table(shape, period, t));
    }
}

impl EffectType for Tremolo {
    const NAME: &'static str = "Tremolo";
    const DESCRIPTION: &'static str = "Modulates the time signal, creating a vibrato effect";

    fn create(ctx: &EffectContext) -> Self {
        let mut params = Parameters::new();
        let speed = params.add(
            "Speed",
            Parameter::tempo(Arc::clone(&ctx.tempo), 60.0, 600.0, 180.0),
        );
        let mix = params.add("Mix", Parameter::real(0.0, 1.0, 0.25));
        let shape = params.add("Shape", Parameter::discrete(&Shape::CHOICES, "Sin"));
        let watch = ParamWatch::new(&[&speed, &shape]);
        let mut fx = Self {
            params,
            speed,
            mix,
            shape,
            watch,
            carrier: Carrier::with_capacity(MAX_CARRIER),
        };
        fx.rebuild();
        fx
    }
}

impl Effect for Tremolo {
    fn name(&self) -> &'static str {
        Self::NAME
    }
    fn description(&self) -> &'static str {
        Self::DESCRIPTION
    }
    fn parameters(&self) -> &Parameters {
        &self.params
    }

    fn process(&mut self, block: &mut [Sample]) {
        if block.is_empty() {
            return;
        }
        if self.watch.changed() {
            self.rebuild();
        }
        if self.carrier.is_empty() {
            return;
        }
        let mix = self.mix.value();
        for s in block.iter_mut() {
            let c = self.carrier.next();
            *s = (1.0 - mix) * *s + mix * *s * c;
        }
    }

    fn reset(&mut self) {
        self.carrier.rewind();
    }
}

pub struct PulseModulation {
    params: Parameters,
    duration: Arc<Parameter>,
    duty: Arc<Parameter>,
    watch: ParamWatch,
    carrier: Carrier,
}

impl PulseModulation {
    fn rebuild(&mut self) {
        let samples = self.duration.value() * f64::from(SAMPLE_RATE);
        let total = samples.floor() as usize;
        let active = ((samples * self.duty.value()).floor() as usize).min(total);
        self.carrier.rebuild(|t| {
            t.extend(hamming(active));
            t.resize(total, 0.0);
        });
    }
}

impl EffectType for PulseModulation {
    const NAME: &'static str = "Pulse Modulation";
    const DESCRIPTION: &'static str = "Introduces pulse width modulation to the signal";

    fn create(_ctx: &EffectContext) -> Self {
        let mut params = Parameters::new();
        let duration = params.add("Duration", Parameter::real(0.0001, 1.0, 0.25));
        let duty = params.add("Duty", Parameter::real(0.0001, 1.0, 0.5));
        let watch = ParamWatch::new(&[&duration, &duty]);
        let mut fx = Self {
            params,
            duration,
            duty,
            watch,
            carrier: Carrier::with_capacity(MAX_CARRIER),
        };
        fx.rebuild();
        fx
    }
}

impl Effect for PulseModulation {
    fn name(&self) -> &'static str {
        Self::NAME
    }
    fn description(&self) -> &'static str {
        Self::DESCRIPTION
    }
    fn parameters(&self) -> &Parameters {
        &self.params
    }

    fn process(&mut self, block: &mut [Sample]) {
        if block.is_empty() {
            return;
        }
        if self.watch.changed() {
            self.rebuild();
        }
        if self.carrier.is_empty() {
            return;
        }
        for s in block.iter_mut() {
            *s *= self.carrier.next();
        }
    }

    fn reset(&mut self) {
        self.carrier.rewind();
    }
}

//! Channel readings, per-line samples, and fixed-quota sample sets.
//!
//! A telemetry line carries up to three channel readings. Each reading is
//! either an integer or unset; unset is a valid value, distinct from zero.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroUsize;

/// One of the three sensor channels embedded in a telemetry line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    /// Arduino Mega ADC reading (`ARD` columns).
    A,
    /// ESP32 ADC reading (`ESP` columns).
    E,
    /// ADS1115 ADC reading (`ADS` columns).
    D,
}

impl Channel {
    /// All channels in wire order.
    pub const ALL: [Channel; 3] = [Channel::A, Channel::E, Channel::D];

    /// Map a one-letter wire prefix to its channel.
    pub fn from_prefix(prefix: char) -> Option<Self> {
        match prefix {
            'A' => Some(Channel::A),
            'E' => Some(Channel::E),
            'D' => Some(Channel::D),
            _ => None,
        }
    }

    /// The wire prefix for this channel.
    pub fn prefix(self) -> char {
        match self {
            Channel::A => 'A',
            Channel::E => 'E',
            Channel::D => 'D',
        }
    }

    /// Column family name used in the table header.
    pub fn column_family(self) -> &'static str {
        match self {
            Channel::A => "ARD",
            Channel::E => "ESP",
            Channel::D => "ADS",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.prefix())
    }
}

/// The readings parsed from one telemetry line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Sample {
    pub a: Option<i64>,
    pub e: Option<i64>,
    pub d: Option<i64>,
}

impl Sample {
    pub fn new(a: Option<i64>, e: Option<i64>, d: Option<i64>) -> Self {
        Sample { a, e, d }
    }

    /// Reading for a channel.
    pub fn get(&self, channel: Channel) -> Option<i64> {
        match channel {
            Channel::A => self.a,
            Channel::E => self.e,
            Channel::D => self.d,
        }
    }

    /// Overwrite the reading for a channel.
    pub fn set(&mut self, channel: Channel, value: Option<i64>) {
        match channel {
            Channel::A => self.a = value,
            Channel::E => self.e = value,
            Channel::D => self.d = value,
        }
    }

    /// True when no channel carries a value; such a sample is noise.
    pub fn is_empty(&self) -> bool {
        self.a.is_none() && self.e.is_none() && self.d.is_none()
    }
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "A:{} | E:{} | D:{}",
            display_reading(self.a),
            display_reading(self.e),
            display_reading(self.d)
        )
    }
}

fn display_reading(value: Option<i64>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => "None".to_string(),
    }
}

/// One collection round: three index-aligned sequences of exactly `quota`
/// slots, filled left to right.
///
/// `ads[i]`, `ard[i]` and `esp[i]` always come from the same accepted line.
///
/// Serialize-only: a set can be built solely through [`SampleSet::new`] and
/// [`SampleSet::push`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SampleSet {
    ads: Vec<Option<i64>>,
    ard: Vec<Option<i64>>,
    esp: Vec<Option<i64>>,
    filled: usize,
}

impl SampleSet {
    /// Create a set with every slot unset.
    pub fn new(quota: NonZeroUsize) -> Self {
        let n = quota.get();
        SampleSet {
            ads: vec![None; n],
            ard: vec![None; n],
            esp: vec![None; n],
            filled: 0,
        }
    }

    /// Store a sample at the current fill index and advance it.
    pub fn push(&mut self, sample: Sample) -> Result<usize> {
        let idx = self.filled;
        let (Some(ads), Some(ard), Some(esp)) = (
            self.ads.get_mut(idx),
            self.ard.get_mut(idx),
            self.esp.get_mut(idx),
        ) else {
            return Err(Error::SetComplete {
                quota: self.quota(),
            });
        };
        *ads = sample.d;
        *ard = sample.a;
        *esp = sample.e;
        self.filled += 1;
        Ok(idx)
    }

    /// Number of slots (the round's sample quota).
    pub fn quota(&self) -> usize {
        self.ads.len()
    }

    /// Number of accepted samples so far.
    pub fn filled(&self) -> usize {
        self.filled
    }

    pub fn is_complete(&self) -> bool {
        self.filled == self.quota()
    }

    pub fn ads(&self) -> &[Option<i64>] {
        &self.ads
    }

    pub fn ard(&self) -> &[Option<i64>] {
        &self.ard
    }

    pub fn esp(&self) -> &[Option<i64>] {
        &self.esp
    }

    /// All slots flattened in table column order: ADS, then ARD, then ESP.
    pub fn columns(&self) -> impl Iterator<Item = Option<i64>> + '_ {
        self.ads
            .iter()
            .chain(self.ard.iter())
            .chain(self.esp.iter())
            .copied()
    }
}

//! Incremental merge of a [`Sample`] into an [`AggregateRow`].
//!
//! The merge is a pure function: storage hands it the current row (or a
//! zero-initialized one) and persists whatever it returns. For each channel
//! present in the sample:
//!
//! ```text
//! raw   = x
//! mean  = (mean * n + x) / (n + 1)     n = samples that supplied this channel
//! n     = n + 1
//! ```
//!
//! Heart rate also tracks a running peak. Band and room samples bump their
//! own family counter so one family never dilutes the other's averages.
//! Position and the emergency flag are latest-value-wins.

use crate::error::{Error, Result};
use crate::models::{AggregateRow, Sample};

// ---

/// A channel value that can be folded into a running mean.
trait Reading: Copy {
    fn as_f64(self) -> f64;
}

impl Reading for f64 {
    fn as_f64(self) -> f64 {
        self
    }
}

impl Reading for i64 {
    fn as_f64(self) -> f64 {
        self as f64
    }
}

/// Fold one present value into a channel's raw/mean/count triple.
fn fold<T: Reading>(value: T, raw: &mut Option<T>, mean: &mut Option<f64>, count: &mut i64) {
    // ---
    // `count` is the number of samples *before* this one.
    let n = *count as f64;
    let prev = mean.unwrap_or(0.0);

    *mean = Some((prev * n + value.as_f64()) / (n + 1.0));
    *raw = Some(value);
    *count += 1;
}

/// Merge `sample` into `old`, returning the updated row.
///
/// Fails with [`Error::Validation`] if a channel is out of range and with
/// [`Error::KeyMismatch`] if the sample belongs to another (device, day).
pub fn merge(old: AggregateRow, sample: &Sample) -> Result<AggregateRow> {
    // ---
    sample.validate()?;

    let found = sample.key();
    if old.key() != found {
        return Err(Error::KeyMismatch {
            expected: old.key(),
            found,
        });
    }

    let mut row = old;

    // Band family
    if let Some(steps) = sample.steps {
        fold(steps, &mut row.steps, &mut row.avg_steps, &mut row.steps_count);
    }
    if let Some(hr) = sample.heartrate {
        fold(
            hr,
            &mut row.heartrate,
            &mut row.avg_heartrate,
            &mut row.heartrate_count,
        );
        row.peak_heartrate = Some(row.peak_heartrate.map_or(hr, |peak| peak.max(hr)));
    }
    if let Some(oxygen) = sample.oxygen {
        fold(
            oxygen,
            &mut row.oxygen,
            &mut row.avg_oxygen,
            &mut row.oxygen_count,
        );
    }
    if sample.has_band() {
        row.band_records_inserted += 1;
    }

    // Room family
    if let Some(humidity) = sample.humidity {
        fold(
            humidity,
            &mut row.humidity,
            &mut row.avg_humidity,
            &mut row.humidity_count,
        );
    }
    if let Some(temperature) = sample.temperature {
        fold(
            temperature,
            &mut row.temperature,
            &mut row.avg_temperature,
            &mut row.temperature_count,
        );
    }
    if let Some(co2) = sample.co2 {
        fold(co2, &mut row.co2, &mut row.avg_co2, &mut row.co2_count);
    }
    if sample.has_room() {
        row.room_records_inserted += 1;
    }

    // Latest value wins, never averaged
    if let Some(lat) = sample.lat {
        row.lat = Some(lat);
    }
    if let Some(lon) = sample.lon {
        row.lon = Some(lon);
    }
    if let Some(flag) = sample.emergency {
        row.emergency = Some(flag);
    }

    Ok(row)
}

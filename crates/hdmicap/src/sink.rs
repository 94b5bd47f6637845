// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 hdmicap developers

use crate::format::FormatState;

/// Receives compressed access units, once per unit, in emission order.
///
/// Called from the encoder reader thread; the slice is only valid for the
/// duration of the call.
pub trait StreamSink: Send + Sync {
    fn on_encoded_unit(&self, unit: &[u8]);
}

/// Receives every format classification made by the detector.
pub trait FormatReporter: Send + Sync {
    fn on_format(&self, state: &FormatState);
}

impl<F> StreamSink for F
where
    F: Fn(&[u8]) + Send + Sync,
{
    fn on_encoded_unit(&self, unit: &[u8]) {
        self(unit)
    }
}

impl<F> FormatReporter for F
where
    F: Fn(&FormatState) + Send + Sync,
{
    fn on_format(&self, state: &FormatState) {
        self(state)
    }
}

/// Discards every unit.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl StreamSink for NullSink {
    fn on_encoded_unit(&self, _unit: &[u8]) {}
}

/// Discards every report.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReporter;

impl FormatReporter for NullReporter {
    fn on_format(&self, _state: &FormatState) {}
}

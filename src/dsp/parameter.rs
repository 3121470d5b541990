//! Parameter definitions and the lock-free parameter bank.
//!
//! Parameters are the controllable values on a node. The control thread
//! writes them by name; the audio thread snapshots them once per block.

use std::sync::atomic::{AtomicU32, Ordering};

/// Definition of a parameter on a processor.
///
/// Each parameter has a unique ID, display name, valid range, and default value.
#[derive(Clone, Debug, PartialEq)]
pub struct ParameterDefinition {
    /// Unique identifier for this parameter within the processor.
    pub id: &'static str,
    /// Human-readable name.
    pub name: &'static str,
    /// Minimum value of the parameter.
    pub min: f32,
    /// Maximum value of the parameter.
    pub max: f32,
    /// Default value when the processor is created.
    pub default: f32,
    /// Unit suffix ("Hz", "ms", "" for none).
    pub unit: &'static str,
}

impl ParameterDefinition {
    /// Creates a new parameter definition.
    pub fn new(
        id: &'static str,
        name: &'static str,
        min: f32,
        max: f32,
        default: f32,
        unit: &'static str,
    ) -> Self {
        Self {
            id,
            name,
            min,
            max,
            default,
            unit,
        }
    }

    /// Creates a normalized parameter (0.0 to 1.0).
    pub fn normalized(id: &'static str, name: &'static str, default: f32) -> Self {
        Self::new(id, name, 0.0, 1.0, default, "")
    }

    /// Creates a frequency parameter.
    pub fn frequency(id: &'static str, name: &'static str, min: f32, max: f32, default: f32) -> Self {
        Self::new(id, name, min, max, default, "Hz")
    }

    /// Creates a toggle (boolean) parameter.
    pub fn toggle(id: &'static str, name: &'static str, default: bool) -> Self {
        Self::new(id, name, 0.0, 1.0, if default { 1.0 } else { 0.0 }, "")
    }

    /// Clamps a value to this parameter's valid range.
    pub fn clamp(&self, value: f32) -> f32 {
        value.clamp(self.min, self.max)
    }

    /// Normalizes a value from the parameter's range to 0.0-1.0.
    pub fn normalize(&self, value: f32) -> f32 {
        if (self.max - self.min).abs() < f32::EPSILON {
            0.0
        } else {
            (value - self.min) / (self.max - self.min)
        }
    }

    /// Denormalizes a 0.0-1.0 value to the parameter's range.
    pub fn denormalize(&self, normalized: f32) -> f32 {
        self.min + normalized * (self.max - self.min)
    }
}

/// Shared parameter values for one node.
///
/// One `AtomicU32` (f32 bits) per parameter. Writes are last-writer-wins and
/// independent per parameter; there is no transaction across parameters.
/// The bank is shared through an `Arc` between the control-side node and the
/// runner slot that owns the processor.
#[derive(Debug)]
pub struct ParameterBank {
    definitions: Vec<ParameterDefinition>,
    values: Vec<AtomicU32>,
}

impl ParameterBank {
    /// Creates a bank holding each parameter's default value.
    pub fn new(definitions: &[ParameterDefinition]) -> Self {
        let values = definitions
            .iter()
            .map(|def| AtomicU32::new(def.default.to_bits()))
            .collect();
        Self {
            definitions: definitions.to_vec(),
            values,
        }
    }

    /// Returns the parameter definitions in index order.
    pub fn definitions(&self) -> &[ParameterDefinition] {
        &self.definitions
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the node has no parameters.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Looks up a parameter index by id.
    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.definitions.iter().position(|def| def.id == id)
    }

    /// Reads a parameter by index.
    pub fn get(&self, index: usize) -> Option<f32> {
        self.values
            .get(index)
            .map(|v| f32::from_bits(v.load(Ordering::Acquire)))
    }

    /// Writes a parameter by index, clamped to its range.
    ///
    /// Returns the stored value, or `None` for an unknown index.
    pub fn set(&self, index: usize, value: f32) -> Option<f32> {
        let def = self.definitions.get(index)?;
        let clamped = def.clamp(value);
        self.values[index].store(clamped.to_bits(), Ordering::Release);
        Some(clamped)
    }

    /// Reads a parameter by id.
    pub fn get_by_id(&self, id: &str) -> Option<f32> {
        self.index_of(id).and_then(|index| self.get(index))
    }

    /// Writes a parameter by id.
    pub fn set_by_id(&self, id: &str, value: f32) -> Option<f32> {
        self.index_of(id).and_then(|index| self.set(index, value))
    }

    /// Copies every value into `out`. Never allocates.
    ///
    /// REAL-TIME SAFE: atomic loads only.
    pub fn snapshot_into(&self, out: &mut [f32]) {
        for (dst, value) in out.iter_mut().zip(&self.values) {
            *dst = f32::from_bits(value.load(Ordering::Acquire));
        }
    }
}

//! Typed access to positional quest-slot fields.
//!
//! A slot value like `done;27651220;3` is split on `;`. Every positional
//! read and write in the crate goes through [`QuestSlotView`], which bounds
//! the field count and refuses values that would corrupt the encoding.

use crate::error::SlotError;

pub const FIELD_DELIMITER: char = ';';

/// Upper bound on fields in one slot
pub const MAX_FIELDS: usize = 32;

/// Conventional field holding the status token
pub const STATUS_FIELD: usize = 0;
/// Conventional field holding a timestamp in minutes since epoch
pub const TIMESTAMP_FIELD: usize = 1;
/// Conventional field holding the repetition counter
pub const REPETITIONS_FIELD: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestSlotView {
    fields: Vec<String>,
    capacity: usize,
}

impl QuestSlotView {
    /// View over an absent slot
    pub fn empty() -> Self {
        Self {
            fields: Vec::new(),
            capacity: MAX_FIELDS,
        }
    }

    pub fn parse(raw: &str) -> Result<Self, SlotError> {
        Self::with_capacity(raw, MAX_FIELDS)
    }

    pub fn with_capacity(raw: &str, capacity: usize) -> Result<Self, SlotError> {
        let fields: Vec<String> = raw.split(FIELD_DELIMITER).map(str::to_string).collect();
        if fields.len() > capacity {
            return Err(SlotError::TooManyFields {
                found: fields.len(),
                capacity,
            });
        }
        Ok(Self { fields, capacity })
    }

    /// View over an optional stored value; absent slots give an empty view
    pub fn from_stored(raw: Option<&str>) -> Result<Self, SlotError> {
        match raw {
            Some(raw) => Self::parse(raw),
            None => Ok(Self::empty()),
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, index: usize) -> Option<&str> {
        self.fields.get(index).map(String::as_str)
    }

    /// Numeric field; empty or non-numeric content reads as `None`
    pub fn field_u64(&self, index: usize) -> Option<u64> {
        self.field(index).and_then(|f| f.trim().parse().ok())
    }

    /// Write one field, padding any missing fields before it with ""
    pub fn set_field(&mut self, index: usize, value: &str) -> Result<(), SlotError> {
        if index >= self.capacity {
            return Err(SlotError::FieldOutOfRange {
                index,
                capacity: self.capacity,
            });
        }
        if value.contains(FIELD_DELIMITER) {
            return Err(SlotError::Delimiter(value.to_string()));
        }
        if self.fields.len() <= index {
            self.fields.resize(index + 1, String::new());
        }
        self.fields[index] = value.to_string();
        Ok(())
    }

    pub fn encode(&self) -> String {
        self.fields.join(&FIELD_DELIMITER.to_string())
    }
}

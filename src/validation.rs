//! Shape and range validation.
//!
//! The expected shape of an attribute or dataset is resolved from its [`Dimension`]s.
//! Fixed dimensions are constants. Dependent dimensions take the current value of another attribute of the same group, supplied through a resolver closure.
//! All checks here are pure and run before a store is mutated.

use thiserror::Error;

use crate::{
    data_type::{DataType, Elements},
    specs::{AttributeId, Dimension, ValueRange},
    ArrayShape,
};

/// A validation error.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ValidationError {
    /// A dimension depends on an attribute which has not been set.
    #[error("dimension {dimension} depends on attribute {attribute} which has not been set")]
    DimensionMissing {
        /// The index of the dimension.
        dimension: usize,
        /// The attribute governing the dimension.
        attribute: AttributeId,
    },
    /// A value is outside of its permitted range.
    #[error("element {index} has value {value} outside of range {range}")]
    RangeError {
        /// The index of the element.
        index: usize,
        /// The value.
        value: f64,
        /// The permitted range.
        range: ValueRange,
    },
    /// The data type of the values does not match the specification.
    #[error("expected data type {expected}, got {got}")]
    TypeMismatch {
        /// The data type of the specification.
        expected: DataType,
        /// The data type of the values.
        got: DataType,
    },
    /// The number of elements does not match the resolved shape.
    #[error("expected {expected} elements, got {got}")]
    SizeMismatch {
        /// The expected number of elements.
        expected: u64,
        /// The actual number of elements.
        got: u64,
    },
    /// A shape in the store does not match the shape resolved from the specification.
    #[error("expected shape {expected:?}, got {actual:?}")]
    ShapeMismatch {
        /// The resolved shape.
        expected: ArrayShape,
        /// The shape in the store.
        actual: ArrayShape,
    },
    /// A selection is out of the bounds of a shape.
    #[error("selection {selection} is out of bounds of shape {shape:?}")]
    OutOfBounds {
        /// A description of the selection.
        selection: String,
        /// The shape.
        shape: ArrayShape,
    },
    /// A selection has a different dimensionality to a shape.
    #[error("selection has dimensionality {got}, expected {expected}")]
    IncompatibleDimensionality {
        /// The dimensionality of the shape.
        expected: usize,
        /// The dimensionality of the selection.
        got: usize,
    },
    /// Values read from the store could not be decoded.
    #[error("corrupt data: {0}")]
    CorruptData(String),
    /// A string does not fit in its fixed width.
    #[error("string of {length} bytes does not fit in a fixed width of {width} bytes")]
    StringTooLong {
        /// The length of the string.
        length: usize,
        /// The fixed width, including the terminating NUL.
        width: usize,
    },
    /// A string contains a NUL character.
    #[error("string {0:?} contains a NUL character")]
    InvalidString(String),
    /// A signed dimension source has a negative value.
    #[error("dimension source has negative value {0}")]
    NegativeExtent(i32),
    /// The product of extents does not fit in a `u64`.
    #[error("the product of extents {0:?} overflows")]
    ExtentOverflow(ArrayShape),
}

/// Resolve the shape of `dims`.
///
/// `resolver` returns the current extent of a dependent dimension's governing attribute, or [`None`] if it is unset.
///
/// # Errors
/// Returns [`ValidationError::DimensionMissing`] for the first dependent dimension whose attribute is unset.
/// Returns [`ValidationError::ExtentOverflow`] if the number of elements of the shape does not fit in a `u64`.
pub fn resolve_shape(
    dims: &[Dimension],
    resolver: impl Fn(AttributeId) -> Option<u64>,
) -> Result<ArrayShape, ValidationError> {
    let shape = dims
        .iter()
        .enumerate()
        .map(|(dimension, dim)| match dim {
            Dimension::Fixed(extent) => Ok(*extent),
            Dimension::Attribute(attribute) => {
                resolver(*attribute).ok_or(ValidationError::DimensionMissing {
                    dimension,
                    attribute: *attribute,
                })
            }
        })
        .collect::<Result<ArrayShape, _>>()?;
    num_elements(&shape)?;
    Ok(shape)
}

/// The number of elements in `shape`.
///
/// A rank zero shape is a scalar with one element.
///
/// # Errors
/// Returns [`ValidationError::ExtentOverflow`] if the product of the extents does not fit in a `u64`.
pub fn num_elements(shape: &[u64]) -> Result<u64, ValidationError> {
    if shape.contains(&0) {
        return Ok(0);
    }
    shape
        .iter()
        .try_fold(1u64, |acc, &extent| acc.checked_mul(extent))
        .ok_or_else(|| ValidationError::ExtentOverflow(shape.to_vec()))
}

/// Check that a store `actual` shape matches the `expected` resolved shape.
///
/// A scalar and a one element rank one shape are equivalent, the store may represent a scalar either way.
///
/// # Errors
/// Returns [`ValidationError::ShapeMismatch`] if the ranks or any extent differ.
pub fn check_shape(expected: &[u64], actual: &[u64]) -> Result<(), ValidationError> {
    let scalar_like = |shape: &[u64]| shape.is_empty() || shape == [1];
    if expected == actual || (scalar_like(expected) && scalar_like(actual)) {
        Ok(())
    } else {
        Err(ValidationError::ShapeMismatch {
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        })
    }
}

/// Check that `num_elements` matches the number of elements in `shape`.
///
/// # Errors
/// Returns [`ValidationError::SizeMismatch`] if they differ, or [`ValidationError::ExtentOverflow`] if `shape` has too many elements.
pub fn check_num_elements(shape: &[u64], num_elements: usize) -> Result<(), ValidationError> {
    let expected = self::num_elements(shape)?;
    let got = num_elements as u64;
    if expected == got {
        Ok(())
    } else {
        Err(ValidationError::SizeMismatch { expected, got })
    }
}

/// Check that `elements` are of the `expected` data type.
///
/// # Errors
/// Returns [`ValidationError::TypeMismatch`] if they are not.
pub fn check_data_type(expected: DataType, elements: &Elements) -> Result<(), ValidationError> {
    let got = elements.data_type();
    if expected == got {
        Ok(())
    } else {
        Err(ValidationError::TypeMismatch { expected, got })
    }
}

/// Check that every element is within `range` (inclusive).
///
/// Booleans and strings are never range checked.
///
/// # Errors
/// Returns [`ValidationError::RangeError`] for the first element outside of `range`.
pub fn check_range(range: Option<&ValueRange>, elements: &Elements) -> Result<(), ValidationError> {
    let (Some(range), Some(values)) = (range, elements.to_f64_vec()) else {
        return Ok(());
    };
    match values
        .iter()
        .enumerate()
        .find(|(_, value)| !range.contains(**value))
    {
        Some((index, &value)) => Err(ValidationError::RangeError {
            index,
            value,
            range: *range,
        }),
        None => Ok(()),
    }
}

use crate::{
    data_type::{DataType, Elements},
    optional_scalar::{BoolSet, DoubleSet, IntSet, UIntSet},
};

/// The cached value of an attribute of an open group.
///
/// Numeric and boolean scalars are held as [`OptionalScalar`](crate::optional_scalar::OptionalScalar)s, everything else as an optional element buffer.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum AttributeValue {
    Bool(BoolSet),
    UInt(UIntSet),
    Int(IntSet),
    Double(DoubleSet),
    Array(Option<Elements>),
}

impl AttributeValue {
    /// An unset value for an attribute of `data_type` and `rank`.
    pub(crate) fn unset(data_type: DataType, rank: usize) -> Self {
        match (data_type, rank) {
            (DataType::Bool, 0) => Self::Bool(BoolSet::unset()),
            (DataType::UInt, 0) => Self::UInt(UIntSet::unset()),
            (DataType::Int, 0) => Self::Int(IntSet::unset()),
            (DataType::Double, 0) => Self::Double(DoubleSet::unset()),
            _ => Self::Array(None),
        }
    }

    pub(crate) fn is_set(&self) -> bool {
        match self {
            Self::Bool(v) => v.is_set(),
            Self::UInt(v) => v.is_set(),
            Self::Int(v) => v.is_set(),
            Self::Double(v) => v.is_set(),
            Self::Array(v) => v.is_some(),
        }
    }

    /// The value as elements, or [`None`] if unset.
    pub(crate) fn elements(&self) -> Option<Elements> {
        match self {
            Self::Bool(v) => v.as_option().map(Elements::from),
            Self::UInt(v) => v.as_option().map(Elements::from),
            Self::Int(v) => v.as_option().map(Elements::from),
            Self::Double(v) => v.as_option().map(Elements::from),
            Self::Array(v) => v.clone(),
        }
    }

    /// Replace the value.
    ///
    /// `elements` have already been validated against the attribute, so a scalar slot receives exactly one element of its type.
    pub(crate) fn set(&mut self, elements: Elements) {
        match (self, elements) {
            (Self::Bool(v), Elements::Bool(e)) if e.len() == 1 => *v = BoolSet::new(e[0]),
            (Self::UInt(v), Elements::UInt(e)) if e.len() == 1 => *v = UIntSet::new(e[0]),
            (Self::Int(v), Elements::Int(e)) if e.len() == 1 => *v = IntSet::new(e[0]),
            (Self::Double(v), Elements::Double(e)) if e.len() == 1 => *v = DoubleSet::new(e[0]),
            (this, elements) => *this = Self::Array(Some(elements)),
        }
    }

    pub(crate) fn clear(&mut self) {
        match self {
            Self::Bool(v) => v.clear(),
            Self::UInt(v) => v.clear(),
            Self::Int(v) => v.clear(),
            Self::Double(v) => v.clear(),
            Self::Array(v) => *v = None,
        }
    }
}

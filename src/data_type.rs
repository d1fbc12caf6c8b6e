//! Data types and typed element buffers.
//!
//! Every attribute and dataset holds elements of one of five [`DataType`]s.
//! Values move through the crate as [`Elements`], a tagged buffer whose variant always matches its data type, so every marshalling boundary is an exhaustive `match`.
//!
//! ## Store encoding
//! | Data type | Store data type | Encoding |
//! |-----------|-----------------|----------|
//! | `bool`    | [`StoreDataType::FixedString`]`(4)` | `"yes"` or `"no"`, NUL padded |
//! | `uint`    | [`StoreDataType::UInt32`] | native endian |
//! | `int`     | [`StoreDataType::Int32`] | native endian |
//! | `double`  | [`StoreDataType::Float64`] | native endian |
//! | `string`  | [`StoreDataType::FixedString`]`(n)` | UTF-8, NUL padded to `n` bytes |

use derive_more::{Display, From};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::{
    storage::StoreDataType,
    validation::{num_elements, ValidationError},
};

/// The fixed width of an encoded boolean.
pub const BOOL_TOKEN_LENGTH: usize = 4;

const BOOL_TRUE: &[u8; BOOL_TOKEN_LENGTH] = b"yes\0";
const BOOL_FALSE: &[u8; BOOL_TOKEN_LENGTH] = b"no\0\0";

/// The data type of an attribute or dataset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// A boolean.
    #[display("bool")]
    #[serde(alias = "ESCDF_DT_BOOL")]
    Bool,
    /// An unsigned 32-bit integer.
    #[display("uint")]
    #[serde(alias = "ESCDF_DT_UINT")]
    UInt,
    /// A signed 32-bit integer.
    #[display("int")]
    #[serde(alias = "ESCDF_DT_INT")]
    Int,
    /// A 64-bit float.
    #[display("double")]
    #[serde(alias = "ESCDF_DT_DOUBLE")]
    Double,
    /// A fixed width string.
    #[display("string")]
    #[serde(alias = "ESCDF_DT_STRING")]
    String,
}

impl DataType {
    /// Returns true for the integer data types, the only ones which can govern a dimension.
    #[must_use]
    pub const fn is_integer(&self) -> bool {
        matches!(self, Self::UInt | Self::Int)
    }

    /// Returns true for the data types which are checked against value ranges.
    #[must_use]
    pub const fn is_numeric(&self) -> bool {
        matches!(self, Self::UInt | Self::Int | Self::Double)
    }

    /// The store data type of this data type.
    ///
    /// `string_length` is only used by [`DataType::String`].
    #[must_use]
    pub const fn store_data_type(&self, string_length: usize) -> StoreDataType {
        match self {
            Self::Bool => StoreDataType::FixedString(BOOL_TOKEN_LENGTH),
            Self::UInt => StoreDataType::UInt32,
            Self::Int => StoreDataType::Int32,
            Self::Double => StoreDataType::Float64,
            Self::String => StoreDataType::FixedString(string_length),
        }
    }
}

/// A buffer of elements of a single [`DataType`].
#[derive(Clone, Debug, PartialEq, From)]
pub enum Elements {
    /// Booleans.
    Bool(Vec<bool>),
    /// Unsigned integers.
    UInt(Vec<u32>),
    /// Signed integers.
    Int(Vec<i32>),
    /// Doubles.
    Double(Vec<f64>),
    /// Strings.
    String(Vec<String>),
}

impl From<bool> for Elements {
    fn from(value: bool) -> Self {
        Self::Bool(vec![value])
    }
}

impl From<u32> for Elements {
    fn from(value: u32) -> Self {
        Self::UInt(vec![value])
    }
}

impl From<i32> for Elements {
    fn from(value: i32) -> Self {
        Self::Int(vec![value])
    }
}

impl From<f64> for Elements {
    fn from(value: f64) -> Self {
        Self::Double(vec![value])
    }
}

impl From<String> for Elements {
    fn from(value: String) -> Self {
        Self::String(vec![value])
    }
}

impl From<&str> for Elements {
    fn from(value: &str) -> Self {
        Self::String(vec![value.to_string()])
    }
}

impl From<Vec<&str>> for Elements {
    fn from(values: Vec<&str>) -> Self {
        Self::String(values.iter().map(ToString::to_string).collect())
    }
}

impl<T: Element> From<&[T]> for Elements {
    fn from(values: &[T]) -> Self {
        T::into_elements(values.to_vec())
    }
}

impl<T: Element, const N: usize> From<[T; N]> for Elements {
    fn from(values: [T; N]) -> Self {
        T::into_elements(values.to_vec())
    }
}

impl Elements {
    /// Create an empty buffer of `data_type`.
    #[must_use]
    pub fn empty(data_type: DataType) -> Self {
        match data_type {
            DataType::Bool => Self::Bool(vec![]),
            DataType::UInt => Self::UInt(vec![]),
            DataType::Int => Self::Int(vec![]),
            DataType::Double => Self::Double(vec![]),
            DataType::String => Self::String(vec![]),
        }
    }

    /// The data type of the elements.
    #[must_use]
    pub const fn data_type(&self) -> DataType {
        match self {
            Self::Bool(_) => DataType::Bool,
            Self::UInt(_) => DataType::UInt,
            Self::Int(_) => DataType::Int,
            Self::Double(_) => DataType::Double,
            Self::String(_) => DataType::String,
        }
    }

    /// The number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Bool(v) => v.len(),
            Self::UInt(v) => v.len(),
            Self::Int(v) => v.len(),
            Self::Double(v) => v.len(),
            Self::String(v) => v.len(),
        }
    }

    /// Returns true if there are no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The elements as `f64`, or [`None`] for non-numeric data types.
    #[must_use]
    #[allow(clippy::cast_lossless)]
    pub fn to_f64_vec(&self) -> Option<Vec<f64>> {
        match self {
            Self::UInt(v) => Some(v.iter().map(|&u| u as f64).collect()),
            Self::Int(v) => Some(v.iter().map(|&i| i as f64).collect()),
            Self::Double(v) => Some(v.clone()),
            Self::Bool(_) | Self::String(_) => None,
        }
    }

    /// The product of the elements as an extent, or [`None`] for non-integer data types.
    ///
    /// A scalar integer attribute gives its value. An integer array gives the product of its values.
    ///
    /// # Errors
    /// Returns [`ValidationError::NegativeExtent`] if any signed element is negative.
    /// Returns [`ValidationError::ExtentOverflow`] if the product does not fit in a `u64`.
    pub fn extent(&self) -> Result<Option<u64>, ValidationError> {
        let factors = match self {
            Self::UInt(v) => v.iter().map(|&u| u64::from(u)).collect::<Vec<_>>(),
            Self::Int(v) => v
                .iter()
                .map(|&i| u64::try_from(i).map_err(|_| ValidationError::NegativeExtent(i)))
                .collect::<Result<Vec<_>, _>>()?,
            Self::Bool(_) | Self::Double(_) | Self::String(_) => return Ok(None),
        };
        num_elements(&factors).map(Some)
    }

    /// Encode the elements for the store.
    ///
    /// Strings are NUL padded to `string_length` bytes and must leave room for a terminating NUL.
    ///
    /// # Errors
    /// Returns [`ValidationError::StringTooLong`] or [`ValidationError::InvalidString`] if a string cannot be encoded.
    pub fn to_store_bytes(&self, string_length: usize) -> Result<Vec<u8>, ValidationError> {
        Ok(match self {
            Self::Bool(v) => v
                .iter()
                .flat_map(|&b| if b { BOOL_TRUE } else { BOOL_FALSE })
                .copied()
                .collect(),
            Self::UInt(v) => bytemuck::cast_slice(v).to_vec(),
            Self::Int(v) => bytemuck::cast_slice(v).to_vec(),
            Self::Double(v) => bytemuck::cast_slice(v).to_vec(),
            Self::String(v) => {
                let mut bytes = Vec::with_capacity(v.len() * string_length);
                for string in v {
                    if string.contains('\0') {
                        return Err(ValidationError::InvalidString(string.clone()));
                    }
                    if string.len() >= string_length {
                        return Err(ValidationError::StringTooLong {
                            length: string.len(),
                            width: string_length,
                        });
                    }
                    bytes.extend_from_slice(string.as_bytes());
                    bytes.resize(bytes.len() + string_length - string.len(), 0);
                }
                bytes
            }
        })
    }

    /// Decode elements of `data_type` from store bytes.
    ///
    /// # Errors
    /// Returns [`ValidationError::CorruptData`] if `bytes` is not a whole number of elements, a boolean token is not `"yes"` or `"no"`, or a string is not valid UTF-8.
    pub fn from_store_bytes(
        data_type: DataType,
        bytes: &[u8],
        string_length: usize,
    ) -> Result<Self, ValidationError> {
        let element_size = data_type.store_data_type(string_length).element_size();
        if element_size == 0 || bytes.len() % element_size != 0 {
            return Err(ValidationError::CorruptData(format!(
                "{} bytes is not a multiple of the {data_type} element size {element_size}",
                bytes.len()
            )));
        }
        Ok(match data_type {
            DataType::Bool => Self::Bool(
                bytes
                    .chunks_exact(BOOL_TOKEN_LENGTH)
                    .map(decode_bool)
                    .collect::<Result<_, _>>()?,
            ),
            DataType::UInt => Self::UInt(bytemuck::allocation::pod_collect_to_vec(bytes)),
            DataType::Int => Self::Int(bytemuck::allocation::pod_collect_to_vec(bytes)),
            DataType::Double => Self::Double(bytemuck::allocation::pod_collect_to_vec(bytes)),
            DataType::String => Self::String(
                bytes
                    .chunks_exact(string_length)
                    .map(decode_string)
                    .collect::<Result<_, _>>()?,
            ),
        })
    }
}

fn decode_bool(token: &[u8]) -> Result<bool, ValidationError> {
    if token == BOOL_TRUE {
        Ok(true)
    } else if token == BOOL_FALSE {
        Ok(false)
    } else {
        Err(ValidationError::CorruptData(format!(
            "invalid boolean token [{}]",
            token.iter().format(", ")
        )))
    }
}

fn decode_string(bytes: &[u8]) -> Result<String, ValidationError> {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8(bytes[..end].to_vec())
        .map_err(|err| ValidationError::CorruptData(err.to_string()))
}

/// A trait representing an element type of an attribute or dataset.
pub trait Element: Sized + Clone {
    /// The data type of the element.
    const DATA_TYPE: DataType;

    /// Wrap a vector of elements into [`Elements`].
    fn into_elements(elements: Vec<Self>) -> Elements;

    /// Unwrap [`Elements`] into a vector of elements.
    ///
    /// # Errors
    /// Returns [`ValidationError::TypeMismatch`] if the data type of `elements` is not [`Element::DATA_TYPE`].
    fn from_elements(elements: Elements) -> Result<Vec<Self>, ValidationError>;
}

macro_rules! impl_element {
    ($raw_type:ty, $variant:ident) => {
        impl Element for $raw_type {
            const DATA_TYPE: DataType = DataType::$variant;

            fn into_elements(elements: Vec<Self>) -> Elements {
                Elements::$variant(elements)
            }

            fn from_elements(elements: Elements) -> Result<Vec<Self>, ValidationError> {
                match elements {
                    Elements::$variant(elements) => Ok(elements),
                    elements => Err(ValidationError::TypeMismatch {
                        expected: Self::DATA_TYPE,
                        got: elements.data_type(),
                    }),
                }
            }
        }
    };
}

impl_element!(bool, Bool);
impl_element!(u32, UInt);
impl_element!(i32, Int);
impl_element!(f64, Double);
impl_element!(String, String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_store_tokens() {
        let elements = Elements::from(vec![true, false]);
        let bytes = elements.to_store_bytes(0).unwrap();
        assert_eq!(bytes, b"yes\0no\0\0");
        assert_eq!(
            Elements::from_store_bytes(DataType::Bool, &bytes, 0).unwrap(),
            elements
        );
    }

    #[test]
    fn bool_corrupt_token() {
        let err = Elements::from_store_bytes(DataType::Bool, b"yep\0", 0).unwrap_err();
        assert!(matches!(err, ValidationError::CorruptData(_)));
        let err = Elements::from_store_bytes(DataType::Bool, b"no\0", 0).unwrap_err();
        assert!(matches!(err, ValidationError::CorruptData(_)));
    }

    #[test]
    fn string_fixed_width() {
        let elements = Elements::from(vec!["Copper", "O"]);
        let bytes = elements.to_store_bytes(8).unwrap();
        assert_eq!(bytes.len(), 16);
        assert_eq!(&bytes[..8], b"Copper\0\0");
        assert_eq!(
            Elements::from_store_bytes(DataType::String, &bytes, 8).unwrap(),
            elements
        );

        assert_eq!(
            Elements::from("Oxygen 2").to_store_bytes(8),
            Err(ValidationError::StringTooLong {
                length: 8,
                width: 8
            })
        );
        assert!(matches!(
            Elements::from("a\0b").to_store_bytes(8),
            Err(ValidationError::InvalidString(_))
        ));
    }

    #[test]
    fn numeric_store_bytes() {
        let elements = Elements::from(vec![0.0, 0.5, 1.0 / 3.0]);
        let bytes = elements.to_store_bytes(0).unwrap();
        assert_eq!(bytes.len(), 24);
        assert_eq!(
            Elements::from_store_bytes(DataType::Double, &bytes, 0).unwrap(),
            elements
        );
        assert!(Elements::from_store_bytes(DataType::UInt, &[0u8; 5], 0).is_err());
    }

    #[test]
    fn elements_extent() {
        assert_eq!(Elements::from(3u32).extent(), Ok(Some(3)));
        assert_eq!(Elements::from(vec![2u32, 3, 4]).extent(), Ok(Some(24)));
        assert_eq!(
            Elements::from(-1i32).extent(),
            Err(ValidationError::NegativeExtent(-1))
        );
        assert_eq!(Elements::from(1.5).extent(), Ok(None));

        let n = u64::from(u32::MAX);
        assert_eq!(
            Elements::from(vec![u32::MAX; 3]).extent(),
            Err(ValidationError::ExtentOverflow(vec![n, n, n]))
        );
        assert_eq!(Elements::from(vec![u32::MAX, u32::MAX, 0]).extent(), Ok(Some(0)));
    }

    #[test]
    fn element_type_mismatch() {
        assert_eq!(u32::from_elements(Elements::from(2u32)), Ok(vec![2]));
        assert_eq!(
            i32::from_elements(Elements::from(2u32)),
            Err(ValidationError::TypeMismatch {
                expected: DataType::Int,
                got: DataType::UInt
            })
        );
    }
}

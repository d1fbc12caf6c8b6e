//! Scalars that remember whether they have been set.
//!
//! An [`OptionalScalar`] starts out unset with a zero value and only becomes set through [`OptionalScalar::new`].
//! Reading an unset scalar is an [`UninitializedError`], which is how mandatory attributes are enforced.

use thiserror::Error;

/// A scalar value with an "is set" flag.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OptionalScalar<T: Copy + Default> {
    value: T,
    is_set: bool,
}

/// A bool which tracks if it has been set.
pub type BoolSet = OptionalScalar<bool>;
/// An unsigned integer which tracks if it has been set.
pub type UIntSet = OptionalScalar<u32>;
/// A signed integer which tracks if it has been set.
pub type IntSet = OptionalScalar<i32>;
/// A double which tracks if it has been set.
pub type DoubleSet = OptionalScalar<f64>;

/// An unset scalar was read.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("scalar value has not been set")]
pub struct UninitializedError;

impl<T: Copy + Default> Default for OptionalScalar<T> {
    fn default() -> Self {
        Self::unset()
    }
}

impl<T: Copy + Default> OptionalScalar<T> {
    /// Create a set scalar holding `value`.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            value,
            is_set: true,
        }
    }

    /// Create an unset scalar with a zero value.
    #[must_use]
    pub fn unset() -> Self {
        Self {
            value: T::default(),
            is_set: false,
        }
    }

    /// Returns true if the scalar has been set.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.is_set
    }

    /// Get the value.
    ///
    /// # Errors
    /// Returns [`UninitializedError`] if the scalar is unset.
    pub fn get(&self) -> Result<T, UninitializedError> {
        if self.is_set {
            Ok(self.value)
        } else {
            Err(UninitializedError)
        }
    }

    /// Convert to an [`Option`].
    #[must_use]
    pub fn as_option(&self) -> Option<T> {
        self.is_set.then_some(self.value)
    }

    /// Reset the scalar to unset.
    pub fn clear(&mut self) {
        *self = Self::unset();
    }
}

impl<T: Copy + Default> From<T> for OptionalScalar<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl<T: Copy + Default> From<Option<T>> for OptionalScalar<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or_else(Self::unset, Self::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_scalar_set() {
        let var = BoolSet::new(false);
        assert!(var.is_set());
        assert_eq!(var.get(), Ok(false));

        let var = UIntSet::new(1);
        assert!(var.is_set());
        assert_eq!(var.get(), Ok(1));

        let var = IntSet::new(2);
        assert!(var.is_set());
        assert_eq!(var.get(), Ok(2));

        let var = DoubleSet::new(3.0);
        assert!(var.is_set());
        assert_eq!(var.get(), Ok(3.0));
    }

    #[test]
    fn optional_scalar_unset() {
        let mut var = UIntSet::default();
        assert!(!var.is_set());
        assert_eq!(var.get(), Err(UninitializedError));
        assert_eq!(var.as_option(), None);

        var = 7.into();
        assert_eq!(var.as_option(), Some(7));
        var.clear();
        assert!(!var.is_set());
        assert_eq!(UIntSet::from(None), UIntSet::unset());
    }
}

//! Dataset selections.
//!
//! A [`Selection`] picks elements of a dataset for a transfer: everything, a [`Hyperslab`], or an explicit list of points.
//! Selections resolve to linearised (C order) element indices with [`Selection::linearised_indices`], which is also where bounds are checked.

use std::fmt::Display;

use itertools::Itertools;

use crate::{
    validation::{num_elements, ValidationError},
    ArrayIndices, ArrayShape,
};

/// A rectangular selection of a dataset.
///
/// If either `start` or `count` is absent, the hyperslab covers the whole extent of every dimension.
/// An absent `stride` is one in every dimension.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Hyperslab {
    start: Option<ArrayIndices>,
    count: Option<ArrayShape>,
    stride: Option<ArrayShape>,
}

impl Display for Hyperslab {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let fmt_opt = |v: &Option<Vec<u64>>| {
            v.as_ref()
                .map_or_else(|| "-".to_string(), |v| format!("[{}]", v.iter().format(", ")))
        };
        write!(
            f,
            "start {} count {} stride {}",
            fmt_opt(&self.start),
            fmt_opt(&self.count),
            fmt_opt(&self.stride)
        )
    }
}

/// A resolved hyperslab with an explicit start, count, and stride per dimension.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedHyperslab {
    /// The start of each dimension.
    pub start: ArrayIndices,
    /// The number of elements in each dimension.
    pub count: ArrayShape,
    /// The step between elements in each dimension.
    pub stride: ArrayShape,
}

impl Hyperslab {
    /// Create a hyperslab covering the whole extent of a dataset.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Create a hyperslab of `count` elements from `start` with unit stride.
    #[must_use]
    pub fn new(start: ArrayIndices, count: ArrayShape) -> Self {
        Self {
            start: Some(start),
            count: Some(count),
            stride: None,
        }
    }

    /// Create a hyperslab from optional parts.
    #[must_use]
    pub fn new_with_optional(
        start: Option<ArrayIndices>,
        count: Option<ArrayShape>,
        stride: Option<ArrayShape>,
    ) -> Self {
        Self {
            start,
            count,
            stride,
        }
    }

    /// Set the stride.
    #[must_use]
    pub fn with_stride(mut self, stride: ArrayShape) -> Self {
        self.stride = Some(stride);
        self
    }

    /// The start.
    #[must_use]
    pub fn start(&self) -> Option<&[u64]> {
        self.start.as_deref()
    }

    /// The count.
    #[must_use]
    pub fn count(&self) -> Option<&[u64]> {
        self.count.as_deref()
    }

    /// The stride.
    #[must_use]
    pub fn stride(&self) -> Option<&[u64]> {
        self.stride.as_deref()
    }

    /// Returns true if the hyperslab covers the whole extent of a dataset.
    #[must_use]
    pub fn is_all(&self) -> bool {
        self.start.is_none() || self.count.is_none()
    }

    /// Resolve the hyperslab against a dataset `shape`.
    ///
    /// # Errors
    /// Returns [`ValidationError::IncompatibleDimensionality`] if a part does not match the rank of `shape`.
    /// Returns [`ValidationError::OutOfBounds`] if a stride is zero or `start + (count - 1) * stride` exceeds an extent.
    pub fn resolve(&self, shape: &[u64]) -> Result<ResolvedHyperslab, ValidationError> {
        let (Some(start), Some(count)) = (&self.start, &self.count) else {
            return Ok(ResolvedHyperslab {
                start: vec![0; shape.len()],
                count: shape.to_vec(),
                stride: vec![1; shape.len()],
            });
        };
        let stride = self.stride.clone().unwrap_or_else(|| vec![1; shape.len()]);
        for part in [start, count, &stride] {
            if part.len() != shape.len() {
                return Err(ValidationError::IncompatibleDimensionality {
                    expected: shape.len(),
                    got: part.len(),
                });
            }
        }

        let out_of_bounds = || ValidationError::OutOfBounds {
            selection: self.to_string(),
            shape: shape.to_vec(),
        };
        for (((&start, &count), &stride), &extent) in
            start.iter().zip(count).zip(&stride).zip(shape)
        {
            if stride == 0 {
                return Err(out_of_bounds());
            }
            let last = if count == 0 {
                // an empty dimension only needs a start within the extent
                Some(start)
            } else {
                (count - 1)
                    .checked_mul(stride)
                    .and_then(|offset| offset.checked_add(start))
                    .filter(|&last| last < extent)
            };
            if last.map_or(true, |last| last > extent) {
                return Err(out_of_bounds());
            }
        }

        Ok(ResolvedHyperslab {
            start: start.clone(),
            count: count.clone(),
            stride,
        })
    }
}

/// A selection of dataset elements.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Selection {
    /// Every element.
    All,
    /// A hyperslab.
    Hyperslab(Hyperslab),
    /// A list of points, in transfer order.
    Points(Vec<ArrayIndices>),
}

impl From<Hyperslab> for Selection {
    fn from(hyperslab: Hyperslab) -> Self {
        if hyperslab.is_all() {
            Self::All
        } else {
            Self::Hyperslab(hyperslab)
        }
    }
}

impl Display for Selection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Hyperslab(hyperslab) => write!(f, "hyperslab({hyperslab})"),
            Self::Points(points) => write!(
                f,
                "points({})",
                points
                    .iter()
                    .map(|p| format!("[{}]", p.iter().format(", ")))
                    .format(", ")
            ),
        }
    }
}

impl Selection {
    /// The number of selected elements in a dataset of `shape`.
    ///
    /// # Errors
    /// Returns a [`ValidationError`] if the selection is incompatible with `shape`.
    pub fn num_elements(&self, shape: &[u64]) -> Result<u64, ValidationError> {
        match self {
            Self::All => num_elements(shape),
            Self::Hyperslab(hyperslab) => num_elements(&hyperslab.resolve(shape)?.count),
            Self::Points(points) => Ok(points.len() as u64),
        }
    }

    /// The linearised (C order) indices of the selected elements of a dataset of `shape`, in transfer order.
    ///
    /// # Errors
    /// Returns [`ValidationError::IncompatibleDimensionality`] if the selection rank does not match `shape`.
    /// Returns [`ValidationError::OutOfBounds`] if any selected element is outside of `shape`.
    pub fn linearised_indices(&self, shape: &[u64]) -> Result<Vec<u64>, ValidationError> {
        match self {
            Self::All => Ok((0..num_elements(shape)?).collect()),
            Self::Hyperslab(hyperslab) => hyperslab_indices(&hyperslab.resolve(shape)?, shape),
            Self::Points(points) => points
                .iter()
                .map(|point| {
                    check_point(point, shape)?;
                    ravel_indices(point, shape)
                })
                .collect(),
        }
    }

    /// Check that the selection is compatible with a dataset of `shape` and return the number of selected elements.
    ///
    /// Unlike [`Selection::linearised_indices`], indices are not materialised for [`Selection::All`] and hyperslabs.
    ///
    /// # Errors
    /// Returns [`ValidationError::IncompatibleDimensionality`] or [`ValidationError::OutOfBounds`] if the selection is incompatible with `shape`.
    pub fn validate(&self, shape: &[u64]) -> Result<u64, ValidationError> {
        if let Self::Points(points) = self {
            for point in points {
                check_point(point, shape)?;
            }
        }
        self.num_elements(shape)
    }
}

fn check_point(point: &[u64], shape: &[u64]) -> Result<(), ValidationError> {
    if point.len() != shape.len() {
        Err(ValidationError::IncompatibleDimensionality {
            expected: shape.len(),
            got: point.len(),
        })
    } else if std::iter::zip(point, shape).any(|(i, s)| i >= s) {
        Err(ValidationError::OutOfBounds {
            selection: format!("point [{}]", point.iter().format(", ")),
            shape: shape.to_vec(),
        })
    } else {
        Ok(())
    }
}

fn hyperslab_indices(
    hyperslab: &ResolvedHyperslab,
    shape: &[u64],
) -> Result<Vec<u64>, ValidationError> {
    let ResolvedHyperslab {
        start,
        count,
        stride,
    } = hyperslab;
    let num_elements = num_elements(count)?;
    if num_elements == 0 {
        return Ok(vec![]);
    }
    let mut indices = Vec::with_capacity(usize::try_from(num_elements).unwrap_or_default());
    let mut position = vec![0u64; shape.len()];
    let mut element = start.clone();
    loop {
        indices.push(ravel_indices(&element, shape)?);

        // odometer increment, last dimension fastest
        let mut dim = shape.len();
        loop {
            if dim == 0 {
                return Ok(indices);
            }
            dim -= 1;
            position[dim] += 1;
            if position[dim] < count[dim] {
                element[dim] = start[dim] + position[dim] * stride[dim];
                break;
            }
            position[dim] = 0;
            element[dim] = start[dim];
        }
    }
}

/// Unravel a linearised index to ND indices.
#[must_use]
pub fn unravel_index(mut index: u64, shape: &[u64]) -> ArrayIndices {
    let mut indices = vec![0; shape.len()];
    for (indices_i, &dim) in std::iter::zip(indices.iter_mut().rev(), shape.iter().rev()) {
        *indices_i = index % dim;
        index /= dim;
    }
    indices
}

/// Ravel ND indices to a linearised index.
///
/// # Errors
/// Returns [`ValidationError::ExtentOverflow`] if the linearised index or a stride of `shape` does not fit in a `u64`.
pub fn ravel_indices(indices: &[u64], shape: &[u64]) -> Result<u64, ValidationError> {
    let overflow = || ValidationError::ExtentOverflow(shape.to_vec());
    let mut index: u64 = 0;
    let mut count: u64 = 1;
    for (i, s) in std::iter::zip(indices, shape).rev() {
        index = i
            .checked_mul(count)
            .and_then(|offset| offset.checked_add(index))
            .ok_or_else(overflow)?;
        count = count.checked_mul(*s).ok_or_else(overflow)?;
    }
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hyperslab_rank_one() {
        let selection = Selection::from(Hyperslab::new(vec![1], vec![2]));
        assert_eq!(selection.linearised_indices(&[5]).unwrap(), vec![1, 2]);
        assert_eq!(selection.num_elements(&[5]).unwrap(), 2);
    }

    #[test]
    fn hyperslab_strided() {
        let selection = Selection::from(Hyperslab::new(vec![0, 1], vec![2, 2]).with_stride(vec![2, 2]));
        assert_eq!(
            selection.linearised_indices(&[4, 4]).unwrap(),
            vec![1, 3, 9, 11]
        );
    }

    #[test]
    fn hyperslab_bounds() {
        let shape = [5];
        assert!(Hyperslab::new(vec![3], vec![2]).resolve(&shape).is_ok());
        assert!(matches!(
            Hyperslab::new(vec![4], vec![2]).resolve(&shape),
            Err(ValidationError::OutOfBounds { .. })
        ));
        assert!(matches!(
            Hyperslab::new(vec![0], vec![3]).with_stride(vec![3]).resolve(&shape),
            Err(ValidationError::OutOfBounds { .. })
        ));
        assert!(matches!(
            Hyperslab::new(vec![0], vec![1]).with_stride(vec![0]).resolve(&shape),
            Err(ValidationError::OutOfBounds { .. })
        ));
        assert!(matches!(
            Hyperslab::new(vec![0, 0], vec![1, 1]).resolve(&shape),
            Err(ValidationError::IncompatibleDimensionality {
                expected: 1,
                got: 2
            })
        ));
        assert!(Hyperslab::new(vec![5], vec![0]).resolve(&shape).is_ok());
        assert!(Selection::from(Hyperslab::new(vec![2], vec![0]))
            .linearised_indices(&shape)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn validate_points() {
        let shape = [3, 3];
        let points = Selection::Points(vec![vec![0, 2], vec![2, 0]]);
        assert_eq!(points.validate(&shape).unwrap(), 2);
        assert!(matches!(
            Selection::Points(vec![vec![0, 3]]).validate(&shape),
            Err(ValidationError::OutOfBounds { .. })
        ));
        assert!(matches!(
            Selection::Points(vec![vec![0]]).validate(&shape),
            Err(ValidationError::IncompatibleDimensionality { .. })
        ));
        assert_eq!(Selection::Points(vec![]).validate(&shape).unwrap(), 0);
        assert_eq!(Selection::All.validate(&shape).unwrap(), 9);
    }

    #[test]
    fn hyperslab_partial_selects_all() {
        let hyperslab = Hyperslab::new_with_optional(Some(vec![1]), None, None);
        assert!(hyperslab.is_all());
        assert_eq!(Selection::from(hyperslab), Selection::All);
        assert_eq!(
            Selection::All.linearised_indices(&[2, 2]).unwrap(),
            vec![0, 1, 2, 3]
        );
    }

    #[test]
    fn points() {
        let selection = Selection::Points(vec![vec![2, 1], vec![0, 0]]);
        assert_eq!(selection.linearised_indices(&[3, 3]).unwrap(), vec![7, 0]);
        assert!(matches!(
            Selection::Points(vec![vec![3, 0]]).linearised_indices(&[3, 3]),
            Err(ValidationError::OutOfBounds { .. })
        ));
        assert!(Selection::Points(vec![])
            .linearised_indices(&[3, 3])
            .unwrap()
            .is_empty());
    }

    #[test]
    fn scalar_selection() {
        assert_eq!(Selection::All.linearised_indices(&[]).unwrap(), vec![0]);
        let hyperslab = Hyperslab::new(vec![], vec![]);
        assert_eq!(
            Selection::Hyperslab(hyperslab)
                .linearised_indices(&[])
                .unwrap(),
            vec![0]
        );
    }

    #[test]
    fn ravel_unravel() {
        let shape = [3, 4, 5];
        assert_eq!(ravel_indices(&[1, 2, 3], &shape).unwrap(), 33);
        assert_eq!(unravel_index(33, &shape), vec![1, 2, 3]);
    }

    #[test]
    fn extent_overflow() {
        let n = u64::from(u32::MAX);
        let shape = [n, n, n];
        assert_eq!(
            Selection::All.num_elements(&shape),
            Err(ValidationError::ExtentOverflow(shape.to_vec()))
        );
        assert!(matches!(
            Selection::All.validate(&shape),
            Err(ValidationError::ExtentOverflow(_))
        ));
        assert!(matches!(
            ravel_indices(&[n - 1, n - 1, n - 1], &shape),
            Err(ValidationError::ExtentOverflow(_))
        ));
        assert!(matches!(
            Selection::Points(vec![vec![1, 0, 0]]).linearised_indices(&shape),
            Err(ValidationError::ExtentOverflow(_))
        ));
        assert_eq!(
            Selection::from(Hyperslab::new(vec![0, 0, 0], vec![n, n, n])).num_elements(&shape),
            Err(ValidationError::ExtentOverflow(shape.to_vec()))
        );
    }
}

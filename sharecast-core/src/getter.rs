//! The retrieval capability every data source implements
//!
//! A [`Getter`] can fetch one share by coordinate or a whole square for a
//! [`Root`]. Local stores, peer exchange and cascades of other getters all
//! expose exactly this surface.

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

use crate::context::{Context, ContextError};
use crate::share::{DataHash, ExtendedDataSquare, Root, Share, ShareError};

#[derive(Debug, Error)]
pub enum GetterError {
    /// Cancellation or deadline shaped failure. Getters also use this for
    /// their own internal timeouts, so it says nothing about the caller.
    #[error(transparent)]
    Context(#[from] ContextError),

    #[error("data not found: {0}")]
    NotFound(DataHash),

    #[error("share ({row}, {col}) out of bounds for square width {width}")]
    OutOfBounds { row: usize, col: usize, width: usize },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("exchange error: {0}")]
    Exchange(String),

    #[error("invalid data: {0}")]
    Invalid(#[from] ShareError),

    #[error("no getters available")]
    NoGetters,

    #[error(transparent)]
    Exhausted(ErrorList),
}

impl GetterError {
    pub fn is_cancellation(&self) -> bool {
        matches!(self, GetterError::Context(_))
    }

    /// Whether trying the same request again later may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GetterError::Exhausted(_)
                | GetterError::NotFound(_)
                | GetterError::Storage(_)
                | GetterError::Exchange(_)
                | GetterError::NoGetters
        )
    }
}

/// Every failure collected while falling through a list of getters, in attempt order
#[derive(Debug, Default)]
pub struct ErrorList {
    errors: Vec<GetterError>,
}

impl ErrorList {
    pub fn push(&mut self, err: GetterError) {
        self.errors.push(err);
    }

    pub fn errors(&self) -> &[GetterError] {
        &self.errors
    }

    pub fn iter(&self) -> std::slice::Iter<'_, GetterError> {
        self.errors.iter()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_inner(self) -> Vec<GetterError> {
        self.errors
    }
}

impl fmt::Display for ErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.errors.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{}", err)?;
        }
        Ok(())
    }
}

impl std::error::Error for ErrorList {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.errors
            .first()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

impl FromIterator<GetterError> for ErrorList {
    fn from_iter<I: IntoIterator<Item = GetterError>>(iter: I) -> Self {
        Self {
            errors: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a ErrorList {
    type Item = &'a GetterError;
    type IntoIter = std::slice::Iter<'a, GetterError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.iter()
    }
}

/// Fetches shares and squares for a root.
///
/// Each call yields a payload or an error. Implementations must stop
/// promptly once `ctx` is done and must not keep working past it.
#[async_trait]
pub trait Getter: Send + Sync {
    async fn get_share(
        &self,
        ctx: &Context,
        root: &Root,
        row: usize,
        col: usize,
    ) -> Result<Share, GetterError>;

    async fn get_eds(&self, ctx: &Context, root: &Root)
        -> Result<ExtendedDataSquare, GetterError>;
}

/// Bounds check shared by getters that resolve shares from a full square
pub(crate) fn check_bounds(root: &Root, row: usize, col: usize) -> Result<(), GetterError> {
    let width = root.square_width();
    if row >= width || col >= width {
        return Err(GetterError::OutOfBounds { row, col, width });
    }
    Ok(())
}

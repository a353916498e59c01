//! Shares, extended data squares and the roots that address them
//!
//! A square is addressed by its [`Root`]: one BLAKE3 commitment per row and
//! per column. The root's own [`DataHash`] is the key used by stores and
//! peer requests.

use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Length in bytes of every commitment in this crate
pub const HASH_SIZE: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ShareError {
    #[error("square must contain at least one share")]
    EmptySquare,

    #[error("square of width {width} needs {expected} shares, got {actual}")]
    ShareCount {
        width: usize,
        expected: usize,
        actual: usize,
    },

    #[error("share {index} has size {actual}, expected {expected}")]
    ShareSize {
        index: usize,
        expected: usize,
        actual: usize,
    },

    #[error("square width {0} is too large")]
    WidthOverflow(usize),

    #[error("root has {rows} row roots and {columns} column roots")]
    RootMismatch { rows: usize, columns: usize },

    #[error("invalid hash: {0}")]
    InvalidHash(String),
}

/// BLAKE3 digest naming a row, a column or a whole square
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DataHash([u8; HASH_SIZE]);

impl DataHash {
    pub const fn new(bytes: [u8; HASH_SIZE]) -> Self {
        Self(bytes)
    }

    /// Hash arbitrary bytes
    pub fn digest(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for DataHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for DataHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DataHash({})", self.to_hex())
    }
}

impl FromStr for DataHash {
    type Err = ShareError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = hex::decode(s).map_err(|e| ShareError::InvalidHash(e.to_string()))?;
        let bytes: [u8; HASH_SIZE] = raw.try_into().map_err(|v: Vec<u8>| {
            ShareError::InvalidHash(format!("expected {} bytes, got {}", HASH_SIZE, v.len()))
        })?;
        Ok(Self(bytes))
    }
}

impl Serialize for DataHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for DataHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Serialize, Deserialize)]
struct RootParts {
    row_roots: Vec<DataHash>,
    column_roots: Vec<DataHash>,
}

/// Data availability header of one block: the identity every fetch is scoped to
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RootParts", into = "RootParts")]
pub struct Root {
    row_roots: Vec<DataHash>,
    column_roots: Vec<DataHash>,
    hash: DataHash,
}

impl Root {
    pub fn new(row_roots: Vec<DataHash>, column_roots: Vec<DataHash>) -> Result<Self, ShareError> {
        if row_roots.is_empty() || row_roots.len() != column_roots.len() {
            return Err(ShareError::RootMismatch {
                rows: row_roots.len(),
                columns: column_roots.len(),
            });
        }

        let hash = Self::new_hash(&row_roots, &column_roots);
        Ok(Self {
            row_roots,
            column_roots,
            hash,
        })
    }

    /// Commitment over all row and column roots
    pub fn hash(&self) -> DataHash {
        self.hash
    }

    pub fn square_width(&self) -> usize {
        self.row_roots.len()
    }

    pub fn row_roots(&self) -> &[DataHash] {
        &self.row_roots
    }

    pub fn column_roots(&self) -> &[DataHash] {
        &self.column_roots
    }

    fn new_hash(row_roots: &[DataHash], column_roots: &[DataHash]) -> DataHash {
        let mut hasher = blake3::Hasher::new();
        for root in row_roots.iter().chain(column_roots.iter()) {
            hasher.update(root.as_bytes());
        }
        DataHash(*hasher.finalize().as_bytes())
    }
}

impl TryFrom<RootParts> for Root {
    type Error = ShareError;

    fn try_from(parts: RootParts) -> Result<Self, Self::Error> {
        Root::new(parts.row_roots, parts.column_roots)
    }
}

impl From<Root> for RootParts {
    fn from(root: Root) -> Self {
        RootParts {
            row_roots: root.row_roots,
            column_roots: root.column_roots,
        }
    }
}

/// One addressable unit of block data
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Share(Bytes);

impl Share {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self(data.into())
    }

    pub fn data(&self) -> &Bytes {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for Share {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

#[derive(Serialize, Deserialize)]
struct SquareParts {
    width: usize,
    shares: Vec<Share>,
}

/// Fully reconstructed square of shares for one root, stored row major
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SquareParts", into = "SquareParts")]
pub struct ExtendedDataSquare {
    width: usize,
    shares: Vec<Share>,
}

impl ExtendedDataSquare {
    /// Build a square, checking its shape and that all shares share one size
    pub fn new(width: usize, shares: Vec<Share>) -> Result<Self, ShareError> {
        if width == 0 || shares.is_empty() {
            return Err(ShareError::EmptySquare);
        }

        let expected = width
            .checked_mul(width)
            .ok_or(ShareError::WidthOverflow(width))?;
        if shares.len() != expected {
            return Err(ShareError::ShareCount {
                width,
                expected,
                actual: shares.len(),
            });
        }

        let share_size = shares[0].len();
        for (index, share) in shares.iter().enumerate() {
            if share.is_empty() || share.len() != share_size {
                return Err(ShareError::ShareSize {
                    index,
                    expected: share_size,
                    actual: share.len(),
                });
            }
        }

        Ok(Self { width, shares })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn share_size(&self) -> usize {
        self.shares[0].len()
    }

    /// Total payload size in bytes
    pub fn size(&self) -> usize {
        self.shares.len() * self.share_size()
    }

    pub fn shares(&self) -> &[Share] {
        &self.shares
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&Share> {
        if row >= self.width || col >= self.width {
            return None;
        }
        self.shares.get(row * self.width + col)
    }

    pub fn row(&self, index: usize) -> Option<&[Share]> {
        if index >= self.width {
            return None;
        }
        let start = index * self.width;
        Some(&self.shares[start..start + self.width])
    }

    pub fn column(&self, index: usize) -> Option<Vec<&Share>> {
        if index >= self.width {
            return None;
        }
        Some(
            (0..self.width)
                .map(|row| &self.shares[row * self.width + index])
                .collect(),
        )
    }

    /// Compute the root committing to this square's rows and columns
    pub fn root(&self) -> Root {
        let row_roots: Vec<DataHash> = (0..self.width)
            .map(|i| hash_shares(self.shares[i * self.width..(i + 1) * self.width].iter()))
            .collect();
        let column_roots: Vec<DataHash> = (0..self.width)
            .map(|i| hash_shares((0..self.width).map(|row| &self.shares[row * self.width + i])))
            .collect();

        Root {
            hash: Root::new_hash(&row_roots, &column_roots),
            row_roots,
            column_roots,
        }
    }
}

impl TryFrom<SquareParts> for ExtendedDataSquare {
    type Error = ShareError;

    fn try_from(parts: SquareParts) -> Result<Self, Self::Error> {
        ExtendedDataSquare::new(parts.width, parts.shares)
    }
}

impl From<ExtendedDataSquare> for SquareParts {
    fn from(eds: ExtendedDataSquare) -> Self {
        SquareParts {
            width: eds.width,
            shares: eds.shares,
        }
    }
}

fn hash_shares<'a>(shares: impl Iterator<Item = &'a Share>) -> DataHash {
    let mut hasher = blake3::Hasher::new();
    for share in shares {
        hasher.update(share.as_ref());
    }
    DataHash(*hasher.finalize().as_bytes())
}

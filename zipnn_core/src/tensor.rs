use std::path::PathBuf;

use crate::dtype::DType;
use crate::error::{Result, ZipNnError};

/// A tensor's raw little-endian storage plus its element dtype and shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    pub dtype: DType,
    pub shape: Vec<u64>,
    pub data: Vec<u8>,
}

impl Tensor {
    /// Build a tensor, checking that `data` holds exactly `product(shape)`
    /// elements of `dtype`.
    pub fn new(dtype: DType, shape: Vec<u64>, data: Vec<u8>) -> Result<Self> {
        let tensor = Self { dtype, shape, data };
        tensor.validate()?;
        Ok(tensor)
    }

    pub fn from_f32(shape: Vec<u64>, values: &[f32]) -> Result<Self> {
        let data = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        Self::new(DType::Float32, shape, data)
    }

    pub fn numel(&self) -> u64 {
        self.shape.iter().product()
    }

    pub fn validate(&self) -> Result<()> {
        let expected = self
            .shape
            .iter()
            .try_fold(self.dtype.size() as u64, |acc, &d| acc.checked_mul(d))
            .ok_or_else(|| ZipNnError::config(format!("tensor shape {:?} overflows", self.shape)))?;
        if expected != self.data.len() as u64 {
            return Err(ZipNnError::config(format!(
                "tensor of shape {:?} and dtype {} needs {} bytes but holds {}",
                self.shape,
                self.dtype,
                expected,
                self.data.len()
            )));
        }
        Ok(())
    }

    /// Decode the storage as f32 values. Only meaningful for `Float32`.
    pub fn to_f32(&self) -> Vec<f32> {
        self.data
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }
}

/// The logical input / output of one compress or decompress call.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Bytes(Vec<u8>),
    Tensor(Tensor),
    /// File-backed payloads are part of the interface but not implemented.
    File(PathBuf),
}

impl Payload {
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Payload::Bytes(b) => Some(b),
            Payload::Tensor(t) => Some(&t.data),
            Payload::File(_) => None,
        }
    }

    pub fn into_bytes(self) -> Option<Vec<u8>> {
        match self {
            Payload::Bytes(b) => Some(b),
            Payload::Tensor(t) => Some(t.data),
            Payload::File(_) => None,
        }
    }
}

pub mod backend;
pub mod bitorder;
pub mod bytegroup;
pub mod dtype;
pub mod dtype32;
pub mod error;
pub mod format;
pub mod planes;
pub mod quantize;
pub mod tensor;

pub use backend::{Backend, Method};
pub use bitorder::BitOrder;
pub use dtype::DType;
pub use dtype32::{BitMode, ByteMode};
pub use error::{Result, ZipNnError};
pub use format::{Header, Layout, HEADER_SIZE, MAGIC};
pub use planes::{PlaneEntry, PlaneTable, DEFAULT_THRESHOLD};
pub use quantize::LossyType;
pub use tensor::{Payload, Tensor};

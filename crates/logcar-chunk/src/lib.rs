#![warn(missing_docs)]

//! LogCar chunk engine: split JSON values into log-line-sized fragments and rebuild them
//!
//! Write path: Value → (encrypt) → Chunk (bounded virtual length) → WriteGroup (preorder index)
//! Read path:  Fragments → group by content path → merge → compose → (decrypt) → Value

pub mod chunker;
pub mod cipher;
pub mod error;
pub mod fragment;
pub mod path;
pub mod reassemble;
pub mod size;

pub use chunker::{chunk_value, DEFAULT_MAX_CHUNK_LENGTH};
pub use cipher::{decrypt_value, encrypt_value, KeyMaterial};
pub use error::{ChunkError, Result};
pub use fragment::{Fragment, FragmentTree, Operation, ReceivedFragment, SealedFragment, StructKind, WriteGroup};
pub use path::{ChunkId, PathSegment};
pub use reassemble::{reassemble, verify_sequence};
pub use size::virtual_len;

//! Byte buffers for the BSON codec.
//!
//! Three buffer shapes implement the [`ByteBuffer`] contract:
//!
//! - [`ByteArrayBuffer`]: one contiguous array, fixed capacity.
//! - [`SingleChunkBuffer`]: one chunk, fixed capacity.
//! - [`MultiChunkBuffer`]: a list of chunks, growable through a [`ChunkSource`].
//!
//! Chunks come from a [`ChunkSource`], typically a shared [`BsonChunkPool`].
//! Read-only buffers can be sliced without copying; slices hold their own
//! handles to the chunks they cover.

mod byte_array_buffer;
mod byte_buffer;
mod chunk;
mod error;
mod multi_chunk_buffer;
mod output_chunk_source;
mod pool;
mod single_chunk_buffer;
mod slice;

pub use byte_array_buffer::ByteArrayBuffer;
pub use byte_buffer::{create_buffer, ByteBuffer, MAX_BUFFER_SIZE};
pub use chunk::{Chunk, ChunkSource};
pub use error::BufferError;
pub use multi_chunk_buffer::MultiChunkBuffer;
pub use output_chunk_source::OutputBufferChunkSource;
pub use pool::BsonChunkPool;
pub use single_chunk_buffer::SingleChunkBuffer;
pub use slice::ByteBufferSlice;

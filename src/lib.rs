//! Progressive frame decoder for a JPEG XL-like codestream.
//!
//! Frames are split into independently addressable sections (DC global, DC
//! groups, AC global and one AC section per group and pass). The
//! [`frame::FrameDecoder`] accepts any subset of them in any order, decodes
//! every phase whose dependencies are met and can render the current
//! progress at any time.

pub mod bit_reader;
pub mod decoder;
pub mod decoder_state;
pub mod dimensions;
pub mod entropy;
pub mod error;
pub mod features;
pub mod frame;
pub mod frame_header;
pub mod image;
pub mod loop_filter;
pub mod metadata;
pub mod modular;
pub mod parallel;
pub mod render;
pub mod toc;
pub mod vardct;

pub use decoder::{DecompressParams, Decoder, FrameOutput, decode_frame};
pub use decoder_state::DecoderState;
pub use dimensions::SizeConstraints;
pub use error::{FrameError, Result};
pub use frame::{FrameDecoder, SectionInfo, SectionKind, SectionStatus};
pub use frame_header::FrameHeader;
pub use image::{ImageBundle, JpegData, Plane};
pub use metadata::ImageMetadata;
pub use parallel::ThreadPool;

use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    #[error("Need more data")]
    NeedMoreData = 1,
    #[error("Invalid codestream signature")]
    InvalidSignature = 2,
    #[error("Invalid header field")]
    InvalidHeader = 3,
    #[error("Invalid table of contents")]
    InvalidToc = 4,
    #[error("Invalid section ID")]
    InvalidSection = 5,
    #[error("Frame dimensions exceed the configured limits")]
    DimensionsExceeded = 6,
    #[error("Feature not supported")]
    Unsupported = 7,
    #[error("Non-444 chroma subsampling is not allowed when adaptive DC smoothing is enabled")]
    IncompatibleSubsampling = 8,
    #[error("Cannot use extra channels in patches if color channels are subsampled differently from extra channels")]
    PatchesUpsamplingMismatch = 9,
    #[error("Too many splines")]
    TooManySplines = 10,
    #[error("Invalid modular stream")]
    InvalidModularStream = 11,
    #[error("Invalid AC coefficients")]
    InvalidCoefficients = 12,
    #[error("Quantization table is not a JPEG quantization table")]
    InvalidQuantTable = 13,
    #[error("First quant table unused")]
    UnusedFirstQuantTable = 14,
    #[error("Referenced frame slot is empty")]
    MissingReference = 15,
    #[error("Invalid padding bits")]
    InvalidPadding = 16,

    // Aggregated task failures
    #[error("Error in DC group")]
    DcGroupFailed = 50,
    #[error("Error in AC group")]
    AcGroupFailed = 51,
    #[error("Drawing groups failed")]
    DrawGroupsFailed = 52,

    // Driver errors
    #[error("Invalid section status")]
    InvalidSectionStatus = 60,
    #[error("Premature end of stream")]
    PrematureEnd = 61,

    // Logic errors
    #[error("FinalizeFrame called multiple times")]
    FinalizedTwice = 100,
    #[error("FinalizeFrame called before the frame was fully decoded")]
    NotFullyDecoded = 101,
    #[error("Invalid operation")]
    InvalidOperation = 102,
    #[error("Invalid argument")]
    InvalidArgument = 103,
}

impl FrameError {
    /// Truncated input is the only recoverable outcome; everything else aborts the frame.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, FrameError::NeedMoreData)
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_truncation_is_recoverable() {
        assert!(!FrameError::NeedMoreData.is_fatal());
        assert!(FrameError::InvalidSection.is_fatal());
        assert!(FrameError::DcGroupFailed.is_fatal());
    }
}

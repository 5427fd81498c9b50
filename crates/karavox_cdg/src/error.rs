use thiserror::Error;

pub type Result<T> = std::result::Result<T, DecodeError>;

/// Errors surfaced by the decoder facade.
///
/// Command-level problems (non-CDG packets, unknown instructions,
/// out-of-range coordinates) never reach the caller; they are absorbed
/// during processing the way consumer CDG hardware absorbs them.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("no CDG data provided")]
    EmptyInput,
}

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArrangeError {
    /// The destination range runs past the end of the container.
    #[error("destination [{start}, {end}) exceeds container of {len} records")]
    RangeOutOfBounds { start: u64, end: u64, len: u64 },

    #[error("storage error: {0}")]
    Store(#[from] rod_store::StoreError),
}

pub type ArrangeResult<T> = Result<T, ArrangeError>;

use core::num::TryFromIntError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvArg,
    OutOfBounds,
    BadDescriptor,
    NotPresent,
}

impl From<TryFromIntError> for ErrorCode {
    fn from(_: TryFromIntError) -> Self {
        Self::OutOfBounds
    }
}

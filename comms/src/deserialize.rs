use std::io;

/// A message decoded from a frame body.
///
/// Implementors may borrow from `buf`, which is how received chunks reach the reducer
/// without a copy. A body that does not decode must fail with `io::ErrorKind::InvalidData`.
pub trait Deserialize<'a>: Sized {
    fn deserialize(buf: &'a [u8]) -> io::Result<Self>;
}

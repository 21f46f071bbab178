/// Element types usable as a receive buffer.
///
/// Frames carry `f32` and `f16` bodies that are cast in place, so the buffer they are read into
/// must be aligned to at least 4 bytes.
pub trait Align4: bytemuck::Pod {}

impl Align4 for u32 {}
impl Align4 for i32 {}
impl Align4 for u64 {}
impl Align4 for i64 {}
impl Align4 for f32 {}
impl Align4 for f64 {}

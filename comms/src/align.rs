/// Element types of a receive buffer whose storage is at least 4 byte aligned.
///
/// Frame payloads start right after the 4 byte header, so `f32` and `f16` slices can be
/// borrowed straight out of such a buffer.
pub trait Align4: bytemuck::Pod {}

impl Align4 for u32 {}
impl Align4 for u64 {}
impl Align4 for f32 {}
impl Align4 for f64 {}

use half::f16;

/// How reduction buffers are encoded on the wire.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// Full precision `f32`.
    #[default]
    None,
    /// Half precision `f16`, halving the traffic of every all-reduce step.
    Fp16,
}

impl Compression {
    /// Rounds every value to what survives a trip through this encoding.
    pub fn round_trip(self, data: &mut [f32]) {
        if let Compression::Fp16 = self {
            for x in data {
                *x = f16::from_f32(*x).to_f32();
            }
        }
    }

    /// Encodes `data` into `out`, replacing its contents.
    pub fn encode(data: &[f32], out: &mut Vec<f16>) {
        out.clear();
        out.extend(data.iter().copied().map(f16::from_f32));
    }
}

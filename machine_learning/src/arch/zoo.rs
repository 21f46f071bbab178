use super::{Sequential, activations::ActFn, layers::Layer};
use crate::Result;

/// The width of the hidden dense layers of the stock network.
pub const ALEXNET_HIDDEN: usize = 4096;

const DROPOUT: f32 = 0.5;

/// Builds the AlexNet variant used for 32x32 RGB images.
///
/// Five convolutions shrink a `(3, 32, 32)` input down to a `(256, 2, 2)` feature map, which
/// three dense layers turn into `num_classes` scores.
///
/// # Arguments
/// * `num_classes` - The amount of output scores.
/// * `hidden` - The width of the two hidden dense layers.
/// * `dropout_seed` - The seed of the dropout masks.
///
/// # Returns
/// The network or an error if the dropout layers could not be built.
pub fn alexnet(num_classes: usize, hidden: usize, dropout_seed: u64) -> Result<Sequential> {
    let relu = || Some(ActFn::relu());

    Ok(Sequential::new([
        Layer::conv2d((3, 64), 3, 2, 1, relu()),
        Layer::max_pool2d(2),
        Layer::conv2d((64, 192), 3, 1, 1, relu()),
        Layer::max_pool2d(2),
        Layer::conv2d((192, 384), 3, 1, 1, relu()),
        Layer::conv2d((384, 256), 3, 1, 1, relu()),
        Layer::conv2d((256, 256), 3, 1, 1, relu()),
        Layer::max_pool2d(2),
        Layer::flatten(),
        Layer::dropout(DROPOUT, dropout_seed)?,
        Layer::dense((256 * 2 * 2, hidden), relu()),
        Layer::dropout(DROPOUT, dropout_seed.wrapping_add(1))?,
        Layer::dense((hidden, hidden), relu()),
        Layer::dense((hidden, num_classes), None),
    ]))
}

#[cfg(test)]
mod tests {
    use ndarray::Array4;

    use super::*;
    use crate::{arch::Model, training::ParamManager};

    #[test]
    fn outputs_one_score_per_class() {
        let mut net = alexnet(10, 16, 0).unwrap();
        let manager = ParamManager::new(net.size());

        let y = net
            .forward(&manager, Array4::zeros((2, 3, 32, 32)).into_dyn())
            .unwrap();

        assert_eq!(y.shape(), &[2, 10]);
    }

    #[test]
    fn stock_size() {
        let net = alexnet(10, ALEXNET_HIDDEN, 0).unwrap();
        let convs = (27 + 1) * 64 + (576 + 1) * 192 + (1728 + 1) * 384 + (3456 + 1) * 256
            + (2304 + 1) * 256;
        let dense = (1024 + 1) * 4096 + (4096 + 1) * 4096 + (4096 + 1) * 10;

        assert_eq!(net.size(), convs + dense);
    }
}

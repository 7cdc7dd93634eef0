use ndarray::Array2;
use rand::Rng;

use super::{Pass, layers::Layer};
use crate::{MlErr, Result};

/// A sequential model: information flows forward when computing an output and backward when
/// computing the *deltas* of its layers.
///
/// The parameters of the whole model live in a single flat slice, each layer owns the
/// contiguous chunk that follows the previous layer's.
#[derive(Clone, Debug)]
pub struct Sequential {
    layers: Vec<Layer>,
    offsets: Vec<usize>,
    size: usize,
}

impl Sequential {
    /// Creates a new `Sequential`.
    ///
    /// # Arguments
    /// * `layers` - The layers the sequential is composed of.
    ///
    /// # Returns
    /// A new `Sequential` instance.
    pub fn new<I>(layers: I) -> Self
    where
        I: IntoIterator<Item = Layer>,
    {
        let layers: Vec<Layer> = layers.into_iter().collect();
        let mut offsets = Vec::with_capacity(layers.len());
        let mut size = 0;

        for layer in &layers {
            offsets.push(size);
            size += layer.size();
        }

        Self {
            layers,
            offsets,
            size,
        }
    }

    /// Returns the amount of parameters in the model.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Writes a fresh set of initial parameters into `params`.
    pub fn init<R: Rng>(&self, params: &mut [f32], rng: &mut R) -> Result<()> {
        self.check(params.len(), "params")?;

        for (layer, &offset) in self.layers.iter().zip(&self.offsets) {
            layer.init(&mut params[offset..offset + layer.size()], rng)?;
        }

        Ok(())
    }

    /// Makes a forward pass through the network.
    ///
    /// # Arguments
    /// * `params` - The model's parameters.
    /// * `x` - The input data.
    /// * `pass` - The context of this pass.
    ///
    /// # Returns
    /// The prediction for the given input or an error if occurred.
    pub fn forward(&mut self, params: &[f32], mut x: Array2<f32>, pass: &mut Pass) -> Result<Array2<f32>> {
        self.check(params.len(), "params")?;

        for (layer, &offset) in self.layers.iter_mut().zip(&self.offsets) {
            let size = layer.size();
            x = layer.forward(&params[offset..offset + size], x, pass)?;
        }

        Ok(x)
    }

    /// Backpropagates `d`, the derivative of the loss with respect to the last output,
    /// accumulating the parameters' gradient into `grad`.
    ///
    /// # Returns
    /// The derivative of the loss with respect to the input of the last forward pass.
    pub fn backward(&mut self, params: &[f32], grad: &mut [f32], mut d: Array2<f32>) -> Result<Array2<f32>> {
        self.check(params.len(), "params")?;
        self.check(grad.len(), "grad")?;

        for (layer, &offset) in self.layers.iter_mut().zip(&self.offsets).rev() {
            let range = offset..offset + layer.size();
            d = layer.backward(&params[range.clone()], &mut grad[range], d)?;
        }

        Ok(d)
    }

    pub fn release(&mut self) {
        self.layers.iter_mut().for_each(Layer::release);
    }

    fn check(&self, got: usize, what: &'static str) -> Result<()> {
        if got != self.size {
            return Err(MlErr::SizeMismatch {
                what,
                got,
                expected: self.size,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::arch::Mode;

    #[test]
    fn parameters_are_laid_out_in_layer_order() {
        let model = Sequential::new([
            Layer::dense((2, 3)),
            Layer::relu(),
            Layer::dense((3, 1)),
        ]);

        assert_eq!(model.size(), 9 + 4);
        assert_eq!(model.offsets, vec![0, 9, 9]);
    }

    #[test]
    fn forward_rejects_wrong_param_count() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut pass = Pass::new(Mode::Eval, &mut rng);
        let mut model = Sequential::new([Layer::dense((1, 1))]);

        let err = model.forward(&[1.], array![[1.]], &mut pass).unwrap_err();
        assert!(matches!(err, MlErr::SizeMismatch { got: 1, expected: 2, .. }));
    }

    #[test]
    fn backward_reaches_every_layer() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut model = Sequential::new([
            Layer::dense((2, 2)),
            Layer::leaky_relu(0.1),
            Layer::dense((2, 1)),
        ]);
        let mut params = vec![0.; model.size()];
        model.init(&mut params, &mut rng).unwrap();

        let mut pass = Pass::new(Mode::Train, &mut rng);
        let y = model.forward(&params, array![[1., -1.]], &mut pass).unwrap();
        let mut grad = vec![0.; model.size()];
        model.backward(&params, &mut grad, Array2::ones(y.raw_dim())).unwrap();

        // The last layer's bias always receives the full upstream gradient.
        assert_eq!(grad[grad.len() - 1], 1.);
        assert!(grad[..6].iter().any(|&g| g != 0.));
    }
}

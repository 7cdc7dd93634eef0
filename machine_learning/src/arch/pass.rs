use rand::rngs::StdRng;

/// Whether a forward pass keeps what it needs for a later backward pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Train,
    Eval,
}

/// The context of a single forward pass through a network.
pub struct Pass<'r> {
    mode: Mode,
    rng: &'r mut StdRng,
}

impl<'r> Pass<'r> {
    /// Creates a new `Pass`.
    ///
    /// # Arguments
    /// * `mode` - The mode of the network for this pass.
    /// * `rng` - The random number generator used by stochastic layers (dropout).
    pub fn new(mode: Mode, rng: &'r mut StdRng) -> Self {
        Self { mode, rng }
    }

    pub fn training(&self) -> bool {
        self.mode == Mode::Train
    }

    pub fn rng(&mut self) -> &mut StdRng {
        self.rng
    }
}

pub mod layers;
pub mod loss;
pub mod models;
pub mod ops;
mod pass;
mod replicated;
mod sequential;

pub use pass::{Mode, Pass};
pub use replicated::Replicated;
pub use sequential::Sequential;

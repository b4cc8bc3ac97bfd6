pub mod normalizer;
pub mod shapes;

pub use normalizer::Normalizer;

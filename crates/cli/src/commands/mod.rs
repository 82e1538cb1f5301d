pub mod digiarch;
pub mod standalone;

pub use digiarch::DigiarchCommand;
pub use standalone::StandaloneCommand;

pub mod generator;
pub mod safetensors;

pub use generator::{Generator, Message, Request, StubGenerator};
pub use generator::{find_default_model_dir, load_from_directory};

mod blob;
pub mod shape;

pub use blob::Blob;

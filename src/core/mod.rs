pub mod audio;
pub mod eventstream;
pub mod signer;
pub mod transcribe;

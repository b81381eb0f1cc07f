pub mod modality;
pub mod storage;

pub use modality::Modality;

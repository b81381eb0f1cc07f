pub mod asset;

pub use asset::{
    AssetBlob, AssetError, AssetService, CreateAsset, CreatedAsset, DeletedAsset, UploadedFile,
};

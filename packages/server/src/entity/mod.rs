pub mod multimodal_data;

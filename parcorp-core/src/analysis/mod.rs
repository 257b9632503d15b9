pub mod annotate;
pub mod bbox;
pub mod cropper;
pub mod labels;
pub mod matcher;

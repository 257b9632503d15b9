pub mod detector;
pub mod model;
pub mod yolov12;

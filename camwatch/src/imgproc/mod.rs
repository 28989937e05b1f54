pub mod color;
pub mod drawing;
pub mod motion;

pub use color::{bgr_to_gray, frame_to_bgr};
pub use drawing::{draw_timestamp, Point, Rect, Scalar, TextRenderer};
pub use motion::{dilate, find_contours, threshold, BackgroundSubtractor, Contour, MotionDetector};

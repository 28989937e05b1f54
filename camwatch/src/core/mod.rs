pub mod mat;

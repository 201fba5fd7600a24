pub mod client;
pub mod fitter;

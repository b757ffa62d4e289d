pub mod archive;
pub mod calibration;
pub mod config;
pub mod geometry;
pub mod measure;
pub mod naming;
pub mod pipeline;
pub mod raster;
pub mod results;
pub mod roi;
pub mod selection;
pub mod services;
pub mod threshold;

#[cfg(test)]
mod tests;
